//! Lock commands - Persistent locks shared across invocations

use std::time::Duration;

use clap::Subcommand;
use serde_json::{json, Value};

use super::Context;
use crate::domain::lock::LockBackend;
use crate::infrastructure::lock::StoreLockBackend;

#[derive(Subcommand, Debug)]
pub enum LockCommand {
    /// Acquire or extend a lock
    Acquire {
        name: String,
        /// Lock timeout in milliseconds
        #[arg(long, default_value_t = 30_000)]
        timeout_ms: u64,
    },

    /// Release a lock
    Release { name: String },

    /// Show whether a lock may be available
    Status { name: String },

    /// Wait for a lock to become available
    Wait {
        name: String,
        /// Longest wait in milliseconds
        #[arg(long, default_value_t = 30_000)]
        delay_ms: u64,
    },
}

pub async fn run(context: &Context, command: LockCommand) -> anyhow::Result<()> {
    let output = execute(context, command).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}

async fn execute(context: &Context, command: LockCommand) -> anyhow::Result<Value> {
    // Each invocation is its own request, so only persistent locks make sense
    let mut locks = StoreLockBackend::persistent(context.client.clone(), context.keys());

    let output = match command {
        LockCommand::Acquire { name, timeout_ms } => {
            let acquired = locks
                .acquire(&name, Duration::from_millis(timeout_ms))
                .await?;
            json!({ "lock": name, "acquired": acquired })
        }
        LockCommand::Release { name } => {
            locks.release(&name).await?;
            json!({ "lock": name, "released": true })
        }
        LockCommand::Status { name } => {
            let available = locks.lock_may_be_available(&name).await?;
            json!({ "lock": name, "available": available })
        }
        LockCommand::Wait { name, delay_ms } => {
            let still_locked = locks.wait(&name, Duration::from_millis(delay_ms)).await?;
            json!({ "lock": name, "available": !still_locked })
        }
    };

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lock_survives_invocations() {
        let context = Context::in_memory();

        let output = execute(
            &context,
            LockCommand::Acquire {
                name: "cron".to_string(),
                timeout_ms: 60_000,
            },
        )
        .await
        .unwrap();
        assert_eq!(output["acquired"], true);

        let output = execute(&context, LockCommand::Status { name: "cron".to_string() })
            .await
            .unwrap();
        assert_eq!(output["available"], false);

        execute(&context, LockCommand::Release { name: "cron".to_string() })
            .await
            .unwrap();

        let output = execute(
            &context,
            LockCommand::Wait {
                name: "cron".to_string(),
                delay_ms: 100,
            },
        )
        .await
        .unwrap();
        assert_eq!(output["available"], true);
    }
}
