//! Cache commands - Read and write one bin

use clap::Subcommand;
use serde_json::{json, Map, Value};

use super::Context;
use crate::domain::cache::{CacheBackend, CacheItem, CacheValue, Expiry};
use crate::domain::checksum::UnitOfWork;

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Read items from the bin
    Get {
        #[arg(required = true)]
        cids: Vec<String>,
        /// Also return expired and invalidated items
        #[arg(long)]
        allow_invalid: bool,
    },

    /// Write an item to the bin
    Set {
        cid: String,
        value: String,
        /// Seconds until the item expires; permanent when omitted
        #[arg(long)]
        ttl: Option<u64>,
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Parse the value as JSON and store it serialized
        #[arg(long)]
        json: bool,
    },

    /// Delete items from the bin
    Delete {
        #[arg(required = true)]
        cids: Vec<String>,
    },

    /// Delete every item of the bin
    DeleteAll,

    /// Mark items invalid without deleting them
    Invalidate {
        #[arg(required = true)]
        cids: Vec<String>,
    },

    /// Invalidate every item of the bin
    InvalidateAll,

    /// Invalidate every item carrying any of the tags, in every bin
    InvalidateTags {
        #[arg(required = true)]
        tags: Vec<String>,
    },

    /// Print the current checksum of a tag set
    Checksum {
        #[arg(required = true)]
        tags: Vec<String>,
    },
}

/// Runs a cache command and prints its JSON result
pub async fn run(context: &Context, bin: &str, command: CacheCommand) -> anyhow::Result<()> {
    let output = execute(context, bin, command).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}

async fn execute(context: &Context, bin: &str, command: CacheCommand) -> anyhow::Result<Value> {
    let factory = context.cache_factory();
    let cache = factory.get(bin);
    let mut uow = UnitOfWork::new();

    let output = match command {
        CacheCommand::Get {
            cids,
            allow_invalid,
        } => {
            let lookup = cache.get_multiple(&mut uow, &cids, allow_invalid).await?;

            let found: Map<String, Value> = lookup
                .found
                .into_iter()
                .map(|(cid, item)| (cid, item_json(item)))
                .collect();

            json!({ "found": found, "missing": lookup.missing })
        }
        CacheCommand::Set {
            cid,
            value,
            ttl,
            tags,
            json,
        } => {
            let data = if json {
                CacheValue::Structured(serde_json::from_str(&value)?)
            } else {
                CacheValue::Text(value)
            };

            let expire = match ttl {
                Some(seconds) => Expiry::after(std::time::Duration::from_secs(seconds)),
                None => Expiry::Permanent,
            };

            cache.set(&mut uow, &cid, data, expire, &tags).await?;
            json!({ "stored": cid })
        }
        CacheCommand::Delete { cids } => {
            cache.delete_multiple(&cids).await?;
            json!({ "deleted": cids })
        }
        CacheCommand::DeleteAll => {
            cache.delete_all(&mut uow).await?;
            json!({ "deleted_all": bin })
        }
        CacheCommand::Invalidate { cids } => {
            cache.invalidate_multiple(&cids).await?;
            json!({ "invalidated": cids })
        }
        CacheCommand::InvalidateAll => {
            cache.invalidate_all(&mut uow).await?;
            json!({ "invalidated_all": bin })
        }
        CacheCommand::InvalidateTags { tags } => {
            factory.checksum().invalidate_tags(&mut uow, &tags).await?;
            json!({ "invalidated_tags": tags })
        }
        CacheCommand::Checksum { tags } => {
            let checksum = factory
                .checksum()
                .calculate_checksum(&mut uow, &tags)
                .await?;
            json!({ "tags": tags, "checksum": checksum })
        }
    };

    Ok(output)
}

fn item_json(item: CacheItem) -> Value {
    let data = match item.data {
        CacheValue::Text(text) => Value::String(text),
        CacheValue::Structured(value) => value,
    };

    let expire = match item.expire {
        Expiry::Permanent => Value::Null,
        Expiry::At(timestamp) => json!(timestamp),
    };

    json!({
        "data": data,
        "valid": item.valid,
        "created": item.created,
        "expire": expire,
        "tags": item.tags,
        "checksum": item.checksum,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let context = Context::in_memory();

        execute(
            &context,
            "page",
            CacheCommand::Set {
                cid: "front".to_string(),
                value: r#"{"title":"Front"}"#.to_string(),
                ttl: None,
                tags: strings(&["node:5"]),
                json: true,
            },
        )
        .await
        .unwrap();

        let output = execute(
            &context,
            "page",
            CacheCommand::Get {
                cids: strings(&["front", "other"]),
                allow_invalid: false,
            },
        )
        .await
        .unwrap();

        assert_eq!(output["found"]["front"]["data"]["title"], "Front");
        assert_eq!(output["found"]["front"]["expire"], Value::Null);
        assert_eq!(output["missing"], json!(["other"]));
    }

    #[tokio::test]
    async fn test_invalidate_tags_then_get() {
        let context = Context::in_memory();

        execute(
            &context,
            "page",
            CacheCommand::Set {
                cid: "front".to_string(),
                value: "<html>".to_string(),
                ttl: Some(60),
                tags: strings(&["node:5"]),
                json: false,
            },
        )
        .await
        .unwrap();

        let output = execute(
            &context,
            "page",
            CacheCommand::InvalidateTags {
                tags: strings(&["node:5"]),
            },
        )
        .await
        .unwrap();
        assert_eq!(output["invalidated_tags"], json!(["node:5"]));

        let output = execute(
            &context,
            "page",
            CacheCommand::Get {
                cids: strings(&["front"]),
                allow_invalid: true,
            },
        )
        .await
        .unwrap();
        assert_eq!(output["found"]["front"]["valid"], false);

        let output = execute(
            &context,
            "page",
            CacheCommand::Checksum {
                tags: strings(&["node:5", "x-cache-bin:page"]),
            },
        )
        .await
        .unwrap();
        assert_eq!(output["checksum"], 1);
    }

    #[tokio::test]
    async fn test_set_rejects_invalid_json() {
        let context = Context::in_memory();

        let result = execute(
            &context,
            "page",
            CacheCommand::Set {
                cid: "front".to_string(),
                value: "{oops".to_string(),
                ttl: None,
                tags: Vec::new(),
                json: true,
            },
        )
        .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_set_with_largest_ttl_stays_readable() {
        let context = Context::in_memory();

        execute(
            &context,
            "page",
            CacheCommand::Set {
                cid: "front".to_string(),
                value: "<html>".to_string(),
                ttl: Some(u64::MAX),
                tags: Vec::new(),
                json: false,
            },
        )
        .await
        .unwrap();

        let output = execute(
            &context,
            "page",
            CacheCommand::Get {
                cids: strings(&["front"]),
                allow_invalid: false,
            },
        )
        .await
        .unwrap();

        assert_eq!(output["found"]["front"]["data"], "<html>");
        assert_eq!(output["found"]["front"]["expire"], json!(i64::MAX));
    }
}
