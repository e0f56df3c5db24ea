//! HTTP delivery for supervised camera streams.
//!
//! This crate exposes the HLS artifacts a [`rtsp_recorder::Recorder`]
//! writes to disk. It handles:
//!
//! - **Session lifecycle**: starting a stream-mode recorder per camera and
//!   tearing it down again
//! - **Artifact serving**: manifest vs. segment content negotiation,
//!   existence checks, gzip for manifests
//!
//! # Architecture
//!
//! ```text
//! Browser <--HLS--> stream-delivery <--filesystem--> rtsp-recorder <--RTSP--> camera
//! ```
//!
//! The recording side and the delivery side share nothing but the
//! filesystem: the encoder writes segments, this crate reads them back.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use stream_delivery::{delivery_router, DeliveryState};
//!
//! let state = Arc::new(DeliveryState::new("media".into(), resolver));
//!
//! // Add to your Axum router
//! let app = Router::new().nest("/stream", delivery_router(state));
//! ```
//!
//! # Endpoints
//!
//! | Endpoint | Description |
//! |----------|-------------|
//! | `GET /start/{camera}` | Start a live session, returns the session id |
//! | `GET /stop/{session}` | Stop a live session, removes its artifacts |
//! | `GET /play/{session}/{file}` | Serve the manifest or a segment |

pub mod error;
pub mod routes;
pub mod serve;
mod state;

pub use error::{DeliveryError, DeliveryErrorResponse};
pub use routes::delivery_router;
pub use state::{DeliveryState, SourceResolver, DEFAULT_STREAM_TIME_LIMIT_SECS};
