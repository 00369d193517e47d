//! Runs a hand-written analysis workflow against a small market catalog,
//! then prints the accumulator and the recorded outputs.
//!
//! ```bash
//! cargo run --example market_workflow
//! ```

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures_util::FutureExt;
use serde_json::json;
use statesman::catalog::{Descriptor, HostError, MethodCatalog, MethodOutput, MethodSpec, ObjectType};
use statesman::definition::StateMachine;
use statesman::interpreter::Interpreter;
use statesman::recorder::OutputRecorder;
use std::sync::Arc;
use tracing_error::ErrorLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn build_catalog(recorder: Arc<OutputRecorder>) -> MethodCatalog {
    MethodCatalog::builder()
        .enum_type("TimeUnit", ["Seconds", "Minutes", "Hours", "Days"])
        .object_type(
            ObjectType::new("PricePoint")
                .describe("One daily candle")
                .property("time", Descriptor::timestamp())
                .property("open", Descriptor::number())
                .property("close", Descriptor::number()),
        )
        .method(
            MethodSpec::new("CurrentDate")
                .describe("The current UTC date and time")
                .returns(Descriptor::timestamp())
                .handler(|_| {
                    async move {
                        MethodOutput::value(json!(Utc::now()
                            .format("%Y-%m-%dT%H:%M:%SZ")
                            .to_string()))
                    }
                    .boxed()
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
                            _ => ChronoDuration::days(value),
                        };
                        MethodOutput::value(json!((date + offset)
                            .format("%Y-%m-%dT%H:%M:%SZ")
                            .to_string()))
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
                .handler(|args| {
                    async move {
                        let symbol = args[0].as_str().unwrap_or("?").to_uppercase();
                        // Synthetic candles; a real host would hit a provider here.
                        let base = if symbol == "BTC" { 68_000.0 } else { 3_500.0 };
                        MethodOutput::value(json!([
                            { "time": "2024-05-30T00:00:00Z", "open": base, "close": base * 1.01 },
                            { "time": "2024-05-31T00:00:00Z", "open": base * 1.01, "close": base * 0.99 },
                            { "time": "2024-06-01T00:00:00Z", "open": base * 0.99, "close": base * 1.03 },
                        ]))
                    }
                    .boxed()
                }),
        )
        .record_output(recorder)
        .build()
}

const WORKFLOW: &str = r#"{
    "StartAt": "Today",
    "States": {
        "Today": {
            "Type": "Task",
            "Resource": "CurrentDate",
            "Parameters": {},
            "Next": "WeekAgo"
        },
        "WeekAgo": {
            "Type": "Task",
            "Resource": "arn:aws:states:::lambda:invoke",
            "Parameters": {
                "FunctionName": "AddTime",
                "Payload": {"date.$": "$.Today", "value": -7, "timeUnit": "Days"}
            },
            "Next": "FanOut"
        },
        "FanOut": {
            "Type": "Map",
            "ItemsPath": "$.symbols",
            "MaxConcurrency": 2,
            "Parameters": {"symbol.$": "$", "from.$": "$.WeekAgo", "to.$": "$.Today"},
            "Iterator": {
                "StartAt": "Fetch",
                "States": {
                    "Fetch": {
                        "Type": "Task",
                        "Resource": "GetPriceHistory",
                        "Next": "Keep"
                    },
                    "Keep": {
                        "Type": "Task",
                        "Resource": "RecordOutput",
                        "Parameters": {"category.$": "$.symbol", "content.$": "$.Fetch"},
                        "End": true
                    }
                }
            },
            "End": true
        }
    }
}"#;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("error,statesman=debug"))
        .unwrap();
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(ErrorLayer::default())
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let recorder = Arc::new(OutputRecorder::new());
    let catalog = Arc::new(build_catalog(Arc::clone(&recorder)));

    println!("== catalog metadata ==");
    println!("{}", serde_json::to_string_pretty(&catalog.metadata_document())?);

    let machine = StateMachine::from_json(WORKFLOW)?;
    let interpreter = Interpreter::new(catalog);
    let out = interpreter
        .interpret(&machine, json!({"symbols": ["btc", "eth"]}))
        .await?;

    println!("\n== accumulator ==");
    println!("{}", serde_json::to_string_pretty(&out)?);

    println!("\n== recorded outputs ==");
    print!("{}", recorder.render());
    Ok(())
}
