//! A small market-analysis catalog used across the integration tests.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures_util::FutureExt;
use serde_json::json;
use statesman::catalog::{
    Descriptor, HostError, MethodCatalog, MethodOutput, MethodSpec, ObjectType,
};
use statesman::recorder::OutputRecorder;
use std::sync::Arc;

pub fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn format_date(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Builds the test catalog: date arithmetic, price history, a streaming
/// news feed, and the RecordOutput side channel.
pub fn market_catalog(recorder: Arc<OutputRecorder>) -> MethodCatalog {
    MethodCatalog::builder()
        .enum_type("TimeUnit", ["Seconds", "Minutes", "Hours", "Days"])
        .object_type(
            ObjectType::new("PricePoint")
                .describe("One candle of price history")
                .property("time", Descriptor::timestamp())
                .property("open", Descriptor::number())
                .property("close", Descriptor::number()),
        )
        .object_type(
            ObjectType::new("NewsItem")
                .property("title", Descriptor::string())
                .property("published", Descriptor::timestamp()),
        )
        .method(
            MethodSpec::new("CurrentDate")
                .describe("The current UTC date and time")
                .returns(Descriptor::timestamp())
                .handler(|_| {
                    async move { MethodOutput::value(json!("2024-06-01T12:00:00Z")) }.boxed()
                }),
        )
        .method(
            MethodSpec::new("AddTime")
                .describe("Adds an offset to a timestamp")
                .param("date", Descriptor::timestamp())
                .param("value", Descriptor::number())
                .param("timeUnit", Descriptor::enumeration("TimeUnit"))
                .returns(Descriptor::timestamp())
                .handler(|args| {
                    async move {
                        let date = args[0]
                            .as_str()
                            .and_then(parse_date)
                            .ok_or_else(|| HostError::msg("AddTime", "unreadable date"))?;
                        let value = args[1].as_f64().unwrap_or(0.0) as i64;
                        let offset = match args[2].as_str() {
                            Some("Seconds") => ChronoDuration::seconds(value),
                            Some("Minutes") => ChronoDuration::minutes(value),
                            Some("Hours") => ChronoDuration::hours(value),
                            Some("Days") => ChronoDuration::days(value),
                            _ => return Err(HostError::msg("AddTime", "unknown time unit")),
                        };
                        MethodOutput::value(json!(format_date(date + offset)))
                    }
                    .boxed()
                }),
        )
        .method(
            MethodSpec::new("GetPriceHistory")
                .describe("Price candles for a symbol between two dates")
                .param("symbol", Descriptor::string())
                .param("from", Descriptor::timestamp())
                .param("to", Descriptor::timestamp())
                .returns(Descriptor::array_of(Descriptor::object("PricePoint")))
                .handler(|_args| {
                    async move {
                        MethodOutput::value(json!([
                            { "time": "2024-05-30T00:00:00Z", "open": 100.0, "close": 104.5 },
                            { "time": "2024-05-31T00:00:00Z", "open": 104.5, "close": 99.25 },
                            { "time": "2024-06-01T00:00:00Z", "open": 99.25, "close": 101.0 },
                        ]))
                    }
                    .boxed()
                }),
        )
        .method(
            MethodSpec::new("GetLatestNews")
                .describe("Most recent news headlines, newest first")
                .param("limit", Descriptor::number())
                .returns(Descriptor::array_of(Descriptor::object("NewsItem")))
                .handler(|args| {
                    async move {
                        let limit = args[0].as_u64().unwrap_or(0) as usize;
                        let stream = async_stream::stream! {
                            let items = [
                                json!({ "title": "ETF inflows accelerate", "published": "2024-06-01T09:00:00Z" }),
                                json!({ "title": "Exchange outage resolved", "published": "2024-06-01T07:30:00Z" }),
                                json!({ "title": "Miner reserves shrink", "published": "2024-05-31T22:10:00Z" }),
                            ];
                            for item in items.into_iter().take(limit) {
                                yield Ok(item);
                            }
                        };
                        Ok(MethodOutput::Stream(Box::pin(stream)))
                    }
                    .boxed()
                }),
        )
        .method(
            MethodSpec::new("AlwaysFails")
                .describe("Fails on every call")
                .returns(Descriptor::null())
                .handler(|_| {
                    async move {
                        Err::<MethodOutput, _>(HostError::msg("AlwaysFails", "synthetic failure"))
                    }
                    .boxed()
                }),
        )
        .record_output(recorder)
        .build()
}

/// Catalog plus the recorder it records into.
pub fn market_fixture() -> (Arc<MethodCatalog>, Arc<OutputRecorder>) {
    let recorder = Arc::new(OutputRecorder::new());
    let catalog = Arc::new(market_catalog(Arc::clone(&recorder)));
    (catalog, recorder)
}
