//! Stick status handling: firmware version, frequency hop and the rain bucket
//! the stick reports. The configured bucket always stays in effect; a
//! differing report is flagged once per distinct reported bucket.

use tracing::info;

use crate::error::{MeteostickError, Result};
use crate::protocol::StatusLine;
use crate::units::RainBucket;

/// What the stick has told us about itself
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StickStatus {
    pub firmware: Option<String>,
    pub hop: Option<u8>,
    pub reported_bucket: Option<RainBucket>,
}

#[derive(Debug, Clone)]
pub struct StatusHandler {
    configured_bucket: RainBucket,
    status: StickStatus,
    flagged: Vec<RainBucket>,
}

impl StatusHandler {
    pub fn new(configured_bucket: RainBucket) -> Self {
        Self {
            configured_bucket,
            status: StickStatus::default(),
            flagged: Vec::new(),
        }
    }

    /// Applies a status line to the stick status.
    ///
    /// # Errors
    ///
    /// `BucketMismatch` the first time the stick reports a given bucket that
    /// differs from configuration. The report is still recorded.
    pub fn apply(&mut self, line: &StatusLine) -> Result<()> {
        match line {
            StatusLine::FirmwareVersion(version) => {
                if self.status.firmware.as_deref() != Some(version.as_str()) {
                    info!("Meteostick firmware version {}", version);
                }
                self.status.firmware = Some(version.clone());
            }
            StatusLine::FrequencyHop(hop) => {
                self.status.hop = Some(*hop);
            }
            StatusLine::RainBucket(reported) => {
                self.status.reported_bucket = Some(*reported);
                if *reported != self.configured_bucket && !self.flagged.contains(reported) {
                    self.flagged.push(*reported);
                    return Err(MeteostickError::BucketMismatch {
                        reported: reported.to_string(),
                        configured: self.configured_bucket.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn status(&self) -> &StickStatus {
        &self.status
    }

    /// Bucket used for rain conversion, regardless of what the stick reports
    pub fn effective_bucket(&self) -> RainBucket {
        self.configured_bucket
    }
}
