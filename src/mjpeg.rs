use axum::body::{Body, Bytes as AxumBytes};
use axum::response::IntoResponse;
use futures::stream;
use image::{ImageBuffer, Rgb};
use tracing::debug;

use crate::relay::FrameSubscription;

const BOUNDARY: &str = "frame";
const JPEG_QUALITY: u8 = 85;

/// Per-subscriber multipart `image/jpeg` stream, variant B of the
/// streaming transport. Drop-oldest at the client's own rate: it reads the
/// relay's single slot, so a slow client simply misses intermediate frames
/// rather than backing up the producer.
pub struct MjpegStream {
    subscription: FrameSubscription,
}

impl MjpegStream {
    pub fn new(subscription: FrameSubscription) -> Self {
        MjpegStream { subscription }
    }

    pub fn into_response(self) -> axum::response::Response {
        let body_stream = stream::unfold(self.subscription, |mut subscription| async move {
            loop {
                match subscription.recv().await {
                    Ok(frame) => match encode_part(&frame) {
                        Ok(bytes) => return Some((Ok::<_, std::io::Error>(bytes), subscription)),
                        Err(err) => {
                            debug!(error = %err, "mjpeg encode failed, skipping frame");
                            continue;
                        }
                    },
                    Err(_) => return None,
                }
            }
        });

        (
            [(
                axum::http::header::CONTENT_TYPE,
                format!("multipart/x-mixed-replace; boundary={BOUNDARY}"),
            )],
            Body::from_stream(body_stream),
        )
            .into_response()
    }
}

fn encode_part(frame: &crate::frame::Frame) -> anyhow::Result<AxumBytes> {
    let img: ImageBuffer<Rgb<u8>, _> =
        ImageBuffer::from_raw(frame.width, frame.height, frame.bytes.as_ref().to_vec())
            .ok_or_else(|| anyhow::anyhow!("frame buffer size mismatch"))?;

    let mut jpeg_bytes: Vec<u8> = Vec::new();
    {
        let mut cursor = std::io::Cursor::new(&mut jpeg_bytes);
        let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut cursor, JPEG_QUALITY);
        encoder.encode_image(&img)?;
    }

    let mut part = Vec::with_capacity(jpeg_bytes.len() + 128);
    part.extend_from_slice(format!("\r\n--{BOUNDARY}\r\n").as_bytes());
    part.extend_from_slice(b"Content-Type: image/jpeg\r\n");
    part.extend_from_slice(format!("Content-Length: {}\r\n\r\n", jpeg_bytes.len()).as_bytes());
    part.extend_from_slice(&jpeg_bytes);
    part.extend_from_slice(b"\r\n");

    Ok(AxumBytes::from(part))
}
