//! Wires configuration, the file-hash index and the standard extensions
//! into a ready capability table.

use crate::config::AgentConfig;
use anyhow::Context;
use destroyclaim_engine::{DestroyClaim, Support};
use destroyclaim_std::{register_std_extensions, FileHashIndex};
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tracing::{info, warn};

/// How a manual-mode claim gets confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// Answer without asking.
    Assume(bool),
    /// Ask on the terminal.
    Prompt,
}

pub struct Agent {
    support: Arc<Support>,
    index: Arc<FileHashIndex>,
}

impl Agent {
    /// Index the configured storage and build the capability table.
    pub async fn start(config: &AgentConfig, confirmation: Confirmation) -> anyhow::Result<Self> {
        let index = Arc::new(
            FileHashIndex::build(&config.storage.root, &config.storage.pattern)
                .await
                .with_context(|| format!("indexing {}", config.storage.root.display()))?,
        );

        let mut builder = config.support_builder();
        register_std_extensions(&mut builder, index.clone())?;

        builder.opt_in_handler(move |claim| {
            let id = claim.id().to_string();
            Box::pin(async move {
                let confirmed = match confirmation {
                    Confirmation::Assume(answer) => answer,
                    Confirmation::Prompt => tokio::task::spawn_blocking(move || ask(&id)).await??,
                };
                Ok(confirmed)
            })
        });
        builder.notification_handler(|claim| {
            Box::pin(async move {
                notify(claim);
                Ok(())
            })
        });

        let support = Arc::new(builder.build()?);
        Ok(Self { support, index })
    }

    pub fn support(&self) -> Arc<Support> {
        self.support.clone()
    }

    pub fn index(&self) -> &FileHashIndex {
        &self.index
    }

    /// Validate a raw claim against this agent.
    pub fn claim(&self, raw: serde_json::Value) -> destroyclaim_engine::Result<DestroyClaim> {
        DestroyClaim::new(raw, self.support())
    }
}

fn ask(claim_id: &str) -> io::Result<bool> {
    let mut stderr = io::stderr();
    write!(
        stderr,
        "If you want to process destroy claim {} please write (yes): ",
        claim_id
    )?;
    stderr.flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(answer.trim() == "yes")
}

fn notify(claim: &DestroyClaim) {
    let contacts = claim.destroy_contacts();
    if contacts.is_empty() {
        warn!(claim_id = %claim.id(), "notification mode without contacts");
    }
    for contact in contacts {
        let name = contact.payload()["name"].as_str().unwrap_or("<unnamed>");
        info!(claim_id = %claim.id(), contact_id = %contact.id(), contact = name, refs = ?contact.refs(), "notifying contact");
    }
}
