//! Server-streaming sinks
//!
//! Watch operations push into a `StreamSink`. Headers are flushed before the first
//! event so clients see the stream open even when nothing happens for a while.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::ApiError;

#[async_trait]
pub trait StreamSink<T: Send + 'static>: Send {
    async fn send_header(&mut self) -> Result<(), ApiError>;
    async fn send(&mut self, item: T) -> Result<(), ApiError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame<T> {
    Header,
    Item(T),
}

/// Sink backed by a bounded channel; fails once the receiver is gone
pub struct ChannelSink<T> {
    tx: mpsc::Sender<StreamFrame<T>>,
}

impl<T: Send + 'static> ChannelSink<T> {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<StreamFrame<T>>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl<T: Send + 'static> StreamSink<T> for ChannelSink<T> {
    async fn send_header(&mut self) -> Result<(), ApiError> {
        self.tx
            .send(StreamFrame::Header)
            .await
            .map_err(|_| ApiError::Stream("client went away".to_string()))
    }

    async fn send(&mut self, item: T) -> Result<(), ApiError> {
        self.tx
            .send(StreamFrame::Item(item))
            .await
            .map_err(|_| ApiError::Stream("client went away".to_string()))
    }
}
