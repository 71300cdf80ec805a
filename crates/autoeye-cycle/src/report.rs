//! Report assembly and handoff to the transport collaborator
//!
//! Delivery is best-effort: a report is handed over only while the transport
//! says it is connected, and dropped otherwise. Nothing is queued or retried.

use std::io::Write;

use autoeye::tracing::prefix;
use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::CycleConfig;
use crate::types::{Detection, LaneSide, Report, VehicleClass};

/// strftime pattern of the wire `timestamp` field (local time, no offset)
pub const WIRE_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Failures reported by a transport collaborator
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("rejected: {0}")]
    Rejected(String),
}

/// Message-transport collaborator
pub trait Transport: Send {
    fn is_connected(&self) -> bool;

    fn publish(&mut self, report: &Report) -> Result<(), TransportError>;
}

/// Record that crosses the publish boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireReport {
    /// Base64 JPEG thumbnail, empty when absent
    pub image: String,
    pub edge_id: String,
    pub location: String,
    pub timestamp: String,
    pub bbox: Vec<WireBox>,
}

/// One detection on the wire; coordinates are rounded to whole pixels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireBox {
    pub class: VehicleClass,
    pub x: i64,
    pub y: i64,
    pub w: i64,
    pub h: i64,
    pub lane: LaneSide,
}

impl From<&Detection> for WireBox {
    fn from(det: &Detection) -> Self {
        Self {
            class: det.class,
            x: det.bbox.x.round() as i64,
            y: det.bbox.y.round() as i64,
            w: det.bbox.width.round() as i64,
            h: det.bbox.height.round() as i64,
            lane: det.lane,
        }
    }
}

impl From<&Report> for WireReport {
    fn from(report: &Report) -> Self {
        Self {
            image: report.thumbnail_base64.clone().unwrap_or_default(),
            edge_id: report.edge_id.clone(),
            location: report.location.clone(),
            timestamp: report.timestamp.format(WIRE_TIMESTAMP_FORMAT).to_string(),
            bbox: report.detections.iter().map(WireBox::from).collect(),
        }
    }
}

/// What happened to a report handed to the publisher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Transport accepted the report
    Published,
    /// Transport was not connected; report dropped
    NotConnected,
    /// Transport refused the report; report dropped
    Rejected(String),
}

/// Builds one report per cycle and hands it to the transport
pub struct ReportPublisher {
    edge_id: String,
    location: String,
    offset: FixedOffset,
    transport: Box<dyn Transport>,
}

impl ReportPublisher {
    pub fn new(config: &CycleConfig, transport: Box<dyn Transport>) -> Self {
        Self {
            edge_id: config.edge_id.clone(),
            location: config.location.clone(),
            // validate() rejects out-of-range offsets
            offset: FixedOffset::east_opt(config.utc_offset_secs).unwrap_or_else(|| Utc.fix()),
            transport,
        }
    }

    pub fn assemble(
        &self,
        now: DateTime<Utc>,
        thumbnail_base64: Option<String>,
        detections: Vec<Detection>,
    ) -> Report {
        Report {
            edge_id: self.edge_id.clone(),
            location: self.location.clone(),
            timestamp: now.with_timezone(&self.offset),
            thumbnail_base64,
            detections,
        }
    }

    /// Hand `report` to the transport if it is connected. The report is
    /// consumed either way.
    pub fn publish(&mut self, report: Report) -> PublishOutcome {
        if !self.transport.is_connected() {
            debug!("{} Transport not connected, dropping report", prefix::PUBLISH);
            return PublishOutcome::NotConnected;
        }

        match self.transport.publish(&report) {
            Ok(()) => {
                info!(
                    "{} Published {} detections at {}",
                    prefix::PUBLISH,
                    report.detections.len(),
                    report.timestamp.format(WIRE_TIMESTAMP_FORMAT)
                );
                PublishOutcome::Published
            }
            Err(e) => {
                warn!("{} Publish failed: {}", prefix::PUBLISH, e);
                PublishOutcome::Rejected(e.to_string())
            }
        }
    }
}

/// Transport writing one wire JSON object per line.
///
/// Counts as connected until closed or until a write fails.
pub struct JsonLinesTransport<W: Write + Send> {
    writer: Option<W>,
}

impl<W: Write + Send> JsonLinesTransport<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Some(writer),
        }
    }

    /// Disconnect, returning the writer
    pub fn close(&mut self) -> Option<W> {
        self.writer.take()
    }
}

impl<W: Write + Send> Transport for JsonLinesTransport<W> {
    fn is_connected(&self) -> bool {
        self.writer.is_some()
    }

    fn publish(&mut self, report: &Report) -> Result<(), TransportError> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| TransportError::Rejected("transport closed".to_string()))?;

        let mut line = serde_json::to_vec(&WireReport::from(report))?;
        line.push(b'\n');
        let written = writer.write_all(&line).and_then(|_| writer.flush());
        if let Err(e) = written {
            self.writer = None;
            return Err(e.into());
        }
        Ok(())
    }
}
