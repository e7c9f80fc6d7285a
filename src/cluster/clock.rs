//! Extrapolated network-clock estimate.
//!
//! A periodic loop samples the authoritative (epoch, slot, block-time)
//! triple; readers get a linear projection from the last sample. The
//! projection can regress between reads when a fresher but lower sample
//! supersedes the previous extrapolation baseline — accepted behavior, not
//! a bug.

use crate::config::ClientConfig;
use crate::error::Result;
use crate::rpc::EndpointPool;
use crate::types::{ClockReading, EpochInfo};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;
use tracing::{debug, instrument};

#[derive(Debug, Clone, Copy)]
struct ClockSample {
    epoch_info: EpochInfo,
    unix_timestamp: i64,
    sampled_at: Instant,
}

pub struct ClusterClock {
    pool: Arc<EndpointPool>,
    default_slot_duration_seconds: f64,
    sample: Mutex<Option<ClockSample>>,
}

impl ClusterClock {
    pub fn new(pool: Arc<EndpointPool>, config: &ClientConfig) -> Self {
        Self {
            pool,
            default_slot_duration_seconds: config.default_slot_duration_seconds,
            sample: Mutex::new(None),
        }
    }

    /// Fetch a fresh authoritative sample: epoch info first, then the block
    /// time of its slot. The stored triple is overwritten whole; readers
    /// never observe epoch/slot/timestamp from different samples.
    #[instrument(skip(self))]
    pub async fn sample(&self) -> Result<()> {
        let epoch_info = self
            .pool
            .dispatch(|endpoint| async move { endpoint.get_epoch_info().await })
            .await?;
        let slot = epoch_info.absolute_slot;
        let unix_timestamp = self
            .pool
            .dispatch(|endpoint| async move { endpoint.get_block_time(slot).await })
            .await?;

        debug!(epoch = epoch_info.epoch, slot, unix_timestamp, "clock sampled");
        *self.sample.lock().unwrap() = Some(ClockSample {
            epoch_info,
            unix_timestamp,
            sampled_at: Instant::now(),
        });
        Ok(())
    }

    /// Extrapolated clock, or `None` if no sample has ever succeeded.
    pub fn read(&self, slot_duration_seconds: Option<f64>) -> Option<ClockReading> {
        let sample = (*self.sample.lock().unwrap())?;
        let slot_duration =
            slot_duration_seconds.unwrap_or(self.default_slot_duration_seconds);

        let elapsed = sample.sampled_at.elapsed();
        let slots_elapsed = (elapsed.as_secs_f64() / slot_duration) as u64;
        let seconds_elapsed = elapsed.as_secs() as i64;

        let info = sample.epoch_info;
        let epoch_elapsed_percent = (info.slots_in_epoch > 0).then(|| {
            let index = (info.slot_index + slots_elapsed) as f64;
            (index / info.slots_in_epoch as f64 * 100.0).min(100.0)
        });

        Some(ClockReading {
            confirmed_epoch: info.epoch,
            confirmed_slot: info.absolute_slot,
            confirmed_unix_timestamp: sample.unix_timestamp,
            slot: info.absolute_slot + slots_elapsed,
            unix_timestamp: sample.unix_timestamp + seconds_elapsed,
            epoch_elapsed_percent,
        })
    }

    pub fn default_slot_duration_seconds(&self) -> f64 {
        self.default_slot_duration_seconds
    }

    #[cfg(test)]
    fn inject_sample(&self, epoch_info: EpochInfo, unix_timestamp: i64) {
        *self.sample.lock().unwrap() = Some(ClockSample {
            epoch_info,
            unix_timestamp,
            sampled_at: Instant::now(),
        });
    }
}
