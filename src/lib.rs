//! invoicepipe - scanned invoice extraction pipeline.
//!
//! Documents are split into pages, each page is classified and cropped to
//! the region worth reading, the crops are transcribed by a vision model in
//! one concurrent batch, and the joined text is structured into JSON and
//! validated against the page images. Stages run on named work queues and
//! report progress on an event bus.

pub mod backends;
pub mod batch;
pub mod capabilities;
pub mod cli;
pub mod config;
pub mod events;
pub mod inference;
pub mod pipeline;
pub mod region;
pub mod work_queue;
