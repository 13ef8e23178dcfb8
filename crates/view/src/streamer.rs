//! Writes a [`Response`] to the connection as `http.response.start` followed by
//! `http.response.body` frames.
//!
//! Buffered content is split into chunks of at most `chunk_size` bytes, the last one flagged
//! with `more_body = false`. Streaming bodies are sent part by part, each part chunked and
//! flagged `more_body = true`, then closed with one empty final frame. Upgrade responses emit
//! nothing. Whatever happens, the response is closed afterwards.

use bytes::Bytes;
use http_body_util::BodyExt;
use micro_frame::codec::{DEFAULT_CHUNK_SIZE, chunk_bytes, encode_header};
use micro_frame::protocol::Outgoing;
use micro_frame::transport::Channel;
use tracing::{debug, trace};

use crate::error::ServeError;
use crate::response::Response;

const SET_COOKIE: &str = "Set-Cookie";

#[derive(Debug, Clone, Copy)]
pub struct ResponseStreamer {
    chunk_size: usize,
}

impl Default for ResponseStreamer {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl ResponseStreamer {
    pub fn new(chunk_size: usize) -> Self {
        Self { chunk_size: chunk_size.max(1) }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub async fn send_response(&self, mut response: Response, channel: &mut Channel) -> Result<(), ServeError> {
        let result = if response.is_upgrade() {
            debug!("upgrade response, the view owns the connection");
            Ok(())
        } else {
            self.write(&mut response, channel).await
        };
        response.close();
        result
    }

    async fn write(&self, response: &mut Response, channel: &mut Channel) -> Result<(), ServeError> {
        let headers = encode_headers(response)?;
        channel.feed(Outgoing::response_start(response.status().as_u16(), headers)).await?;

        let mut body = response.take_body();
        if let Some(content) = body.take_content() {
            trace!(len = content.len(), "sending buffered body");
            for (chunk, last) in chunk_bytes(content, self.chunk_size) {
                channel.send(Outgoing::response_body(chunk, !last)).await?;
            }
            return Ok(());
        }

        while let Some(frame) = body.frame().await {
            let frame = frame.map_err(|source| ServeError::Body { source })?;
            // trailers have no frame in this protocol
            let Ok(part) = frame.into_data() else { continue };
            for (chunk, _) in chunk_bytes(part, self.chunk_size) {
                channel.send(Outgoing::response_body(chunk, true)).await?;
            }
        }
        channel.send(Outgoing::closing_body()).await?;
        Ok(())
    }
}

fn encode_headers(response: &Response) -> Result<Vec<(Bytes, Bytes)>, ServeError> {
    let mut headers = Vec::with_capacity(response.headers().len() + response.cookies().len());
    for (name, value) in response.headers().iter() {
        headers.push(encode_header(name, value)?);
    }
    for cookie in response.cookies() {
        headers.push(encode_header(SET_COOKIE, &cookie.to_string())?);
    }
    Ok(headers)
}
