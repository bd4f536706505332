//! Flood commands - Event windows per identifier

use std::time::Duration;

use clap::Subcommand;
use serde_json::{json, Value};

use super::Context;
use crate::domain::flood::FloodControl;
use crate::infrastructure::flood::StoreFlood;

#[derive(Subcommand, Debug)]
pub enum FloodCommand {
    /// Record one event
    Register {
        name: String,
        identifier: String,
        /// Seconds the event counts for
        #[arg(long, default_value_t = 3600)]
        window: u64,
    },

    /// Check whether another event is allowed
    Check {
        name: String,
        identifier: String,
        #[arg(long)]
        threshold: usize,
    },

    /// Forget every event of an identifier
    Clear { name: String, identifier: String },
}

pub async fn run(context: &Context, command: FloodCommand) -> anyhow::Result<()> {
    let output = execute(context, command).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}

async fn execute(context: &Context, command: FloodCommand) -> anyhow::Result<Value> {
    let flood = StoreFlood::new(context.client.clone(), context.keys());

    let output = match command {
        FloodCommand::Register {
            name,
            identifier,
            window,
        } => {
            flood
                .register(&name, Duration::from_secs(window), &identifier)
                .await?;
            json!({ "event": name, "identifier": identifier, "registered": true })
        }
        FloodCommand::Check {
            name,
            identifier,
            threshold,
        } => {
            let allowed = flood.is_allowed(&name, threshold, &identifier).await?;
            json!({ "event": name, "identifier": identifier, "allowed": allowed })
        }
        FloodCommand::Clear { name, identifier } => {
            flood.clear(&name, &identifier).await?;
            json!({ "event": name, "identifier": identifier, "cleared": true })
        }
    };

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_then_check() {
        let context = Context::in_memory();
        let check = || FloodCommand::Check {
            name: "login".to_string(),
            identifier: "10.0.0.1".to_string(),
            threshold: 1,
        };

        assert_eq!(execute(&context, check()).await.unwrap()["allowed"], true);

        execute(
            &context,
            FloodCommand::Register {
                name: "login".to_string(),
                identifier: "10.0.0.1".to_string(),
                window: 60,
            },
        )
        .await
        .unwrap();

        assert_eq!(execute(&context, check()).await.unwrap()["allowed"], false);
    }
}
