//! The standard extension set, wired to a [`DataConnector`].

use crate::connector::DataConnector;
use crate::schemas;
use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use destroyclaim_core::Result;
use destroyclaim_engine::{EvaluationDescriptor, Extension, ProcessDescriptor, SupportBuilder};
use std::sync::Arc;
use tracing::debug;

pub const STD_SHA256: &str = "std:sha256";
pub const STD_AGENT: &str = "std:agent";
pub const STD_FROM_POINT_IN_TIME: &str = "std:fromPointInTime";
pub const STD_IN_TIME_INTERVAL: &str = "std:inTimeInterval";
pub const STD_DESTRUCTION_LEVEL: &str = "std:destructionLevel";

const DELETED: &str = "deleted";
const WIPED: &str = "wiped";

fn payload_str<'a>(ext: &'a Extension, field: &str) -> anyhow::Result<&'a str> {
    ext.payload()[field]
        .as_str()
        .ok_or_else(|| anyhow!("{} '{}' has no '{}' in its payload", ext.kind(), ext.id(), field))
}

fn payload_time(ext: &Extension, field: &str) -> anyhow::Result<DateTime<Utc>> {
    let raw = payload_str(ext, field)?;
    let parsed = DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("'{}' of '{}' is not an RFC 3339 timestamp", field, ext.id()))?;
    Ok(parsed.with_timezone(&Utc))
}

fn destruction_level(ext: &Extension) -> Option<&str> {
    ext.payload()["destructionLevel"].as_str()
}

/// Register `std:sha256`, `std:agent`, `std:fromPointInTime`,
/// `std:inTimeInterval` and `std:destructionLevel`.
pub fn register_std_extensions(
    builder: &mut SupportBuilder,
    connector: Arc<dyn DataConnector>,
) -> Result<()> {
    let eval = connector.clone();
    let real = connector.clone();
    let sim = connector.clone();
    builder.add_subject_extension(
        STD_SHA256,
        schemas::sha256(),
        EvaluationDescriptor::new(move |ext, _| {
            let connector = eval.clone();
            Box::pin(async move { Ok(Some(connector.exists(payload_str(ext, "hash")?).await)) })
        }),
        ProcessDescriptor::new()
            .real_mode(move |_, subject, _| {
                let connector = real.clone();
                Box::pin(async move {
                    connector.destroy(payload_str(subject, "hash")?).await?;
                    Ok(())
                })
            })
            .simulation_mode(move |_, subject, _| {
                let connector = sim.clone();
                Box::pin(async move {
                    connector.simulate_destroy(payload_str(subject, "hash")?).await?;
                    Ok(())
                })
            }),
    )?;

    builder.add_contact_extension(
        STD_AGENT,
        schemas::agent(),
        EvaluationDescriptor::constant(true),
    )?;

    builder.add_condition_extension(
        STD_FROM_POINT_IN_TIME,
        schemas::from_point_in_time(),
        EvaluationDescriptor::new(|ext, _| {
            Box::pin(async move {
                let from = payload_time(ext, "from")?;
                Ok(Some(Utc::now() >= from))
            })
        }),
    )?;

    builder.add_condition_extension(
        STD_IN_TIME_INTERVAL,
        schemas::in_time_interval(),
        EvaluationDescriptor::new(|ext, _| {
            Box::pin(async move {
                let from = payload_time(ext, "from")?;
                let to = payload_time(ext, "to")?;
                let now = Utc::now();
                Ok(Some(from <= now && now <= to))
            })
        }),
    )?;

    let real = connector.clone();
    let sim = connector;
    builder.add_action_extension(
        STD_DESTRUCTION_LEVEL,
        schemas::destruction_level(),
        EvaluationDescriptor::new(|ext, _| {
            Box::pin(async move { Ok(Some(matches!(destruction_level(ext), Some(DELETED | WIPED)))) })
        }),
        ProcessDescriptor::new()
            .real_mode(move |action, subject, _| {
                let connector = real.clone();
                Box::pin(async move {
                    let hash = payload_str(subject, "hash")?;
                    match destruction_level(action) {
                        Some(DELETED) => {
                            connector.destroy(hash).await?;
                        }
                        Some(WIPED) => {
                            connector.wipe(hash).await?;
                        }
                        other => debug!(action_id = %action.id(), level = ?other, "nothing to destroy"),
                    }
                    Ok(())
                })
            })
            .simulation_mode(move |action, subject, _| {
                let connector = sim.clone();
                Box::pin(async move {
                    if matches!(destruction_level(action), Some(DELETED | WIPED)) {
                        connector.simulate_destroy(payload_str(subject, "hash")?).await?;
                    }
                    Ok(())
                })
            }),
    )?;

    Ok(())
}
