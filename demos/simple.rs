use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use kizuna::*;

// Define regular traits and implementor structs

trait Logger: Send + Sync {
    fn log(&self, content: &str);
}

trait DateLogger: Send + Sync {
    fn log_date(&self);
}

#[derive(Clone, Deserialize)]
struct LoggerConfig {
    prefix: String,
}

struct LoggerImpl {
    prefix: String,
}

impl Logger for LoggerImpl {
    fn log(&self, content: &str) {
        println!("{} {}", self.prefix, content);
    }
}

#[derive(Clone, Deserialize)]
struct DateLoggerConfig {
    #[serde(with = "kizuna::decode::rfc3339")]
    since: DateTime<Utc>,
}

struct DateLoggerImpl {
    logger: Arc<dyn Logger>,
    since: DateTime<Utc>,
}

impl DateLogger for DateLoggerImpl {
    fn log_date(&self) {
        let elapsed = Utc::now() - self.since;
        self.logger
            .log(&format!("{} days since {}", elapsed.num_days(), self.since));
    }
}

const DOCUMENT: &str = r#"{
    "$shared": { "prefix": "[demo]" },
    "logger": { "prefix": ${di.$shared.prefix} },
    "dates": {
        "prefix": ${di.$shared.prefix},
        "since": { "RFC3339": "2000-01-01T00:00:00Z" }
    }
}"#;

fn main() -> Result<()> {
    let logger = InjectionToken::register("logger")?;
    let dates = InjectionToken::register("dates")?;

    // Bind the Logger trait, configured under its token
    register_configured(
        |_: &Context, _: &RegistryOpts, config: LoggerConfig| {
            Ok(Arc::new(LoggerImpl {
                prefix: config.prefix,
            }) as Arc<dyn Logger>)
        },
        &RegistryOpts::new().with_token(&logger),
    )?;

    // Bind the DateLogger trait, depending on the Logger
    let logger_opts = RegistryOpts::new().with_token(&logger);
    register_configured(
        move |ctx: &Context, _: &RegistryOpts, config: DateLoggerConfig| {
            let logger = create_pair::<Arc<dyn Logger>, LoggerConfig>(ctx, &logger_opts)?;
            Ok(Arc::new(DateLoggerImpl {
                logger,
                since: config.since,
            }) as Arc<dyn DateLogger>)
        },
        &RegistryOpts::new().with_token(&dates),
    )?;

    let ctx = context_from_document(DOCUMENT)?;
    let date_logger =
        create_pair::<Arc<dyn DateLogger>, DateLoggerConfig>(&ctx, &RegistryOpts::new().with_token(&dates))?;

    date_logger.log_date();

    Ok(())
}
