//! Command-line client for the argusd daemon.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "argus", about = "Control a running argusd daemon", version)]
struct Cli {
    /// Base URL of the argusd daemon.
    #[arg(long, default_value = "http://127.0.0.1:4000", global = true)]
    server: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the recognition video stream.
    Start,
    /// Stop the recognition video stream.
    Stop,
    /// Enroll a face from an image file.
    AddFace {
        /// Path to the image file.
        #[arg(long)]
        image: PathBuf,
        /// Label to store the face under.
        #[arg(long)]
        label: String,
    },
    /// List enrolled face labels.
    List,
    /// Pulse the alarm buzzer.
    Buzz,
    /// Show daemon status.
    Status,
    /// List local V4L2 capture devices (does not contact the daemon).
    Devices,
    /// Capture one frame from a local camera and save it as JPEG.
    Snapshot {
        /// V4L2 device path.
        #[arg(long, default_value = "/dev/video0")]
        device: String,
        /// Output file path.
        #[arg(long, default_value = "snapshot.jpg")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();
    let client = reqwest::Client::new();

    match cli.command {
        Command::Start => {
            let body = post_json(&client, &format!("{server}/start_stream")).await?;
            println!("{}", message_of(&body));
            println!("feed: {server}/video_feed");
        }
        Command::Stop => {
            let body = post_json(&client, &format!("{server}/stop_stream")).await?;
            println!("{}", message_of(&body));
        }
        Command::AddFace { image, label } => {
            let bytes = std::fs::read(&image)
                .with_context(|| format!("failed to read {}", image.display()))?;
            let file_name = image
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "face.jpg".to_string());

            let form = reqwest::multipart::Form::new()
                .part(
                    "image",
                    reqwest::multipart::Part::bytes(bytes).file_name(file_name),
                )
                .text("label", label);

            let response = client
                .post(format!("{server}/add_face"))
                .multipart(form)
                .send()
                .await
                .context("request failed")?;
            let body = check_json(response).await?;
            println!("{}", message_of(&body));
        }
        Command::List => {
            let response = client
                .get(format!("{server}/faces"))
                .send()
                .await
                .context("request failed")?;
            let body = check_json(response).await?;
            let faces = body
                .get("faces")
                .and_then(|f| f.as_array())
                .cloned()
                .unwrap_or_default();
            if faces.is_empty() {
                println!("no faces enrolled");
            } else {
                for face in faces {
                    println!("{}", face.as_str().unwrap_or("?"));
                }
            }
        }
        Command::Buzz => {
            let body = post_json(&client, &format!("{server}/activate_buzzer")).await?;
            println!("{}", message_of(&body));
        }
        Command::Status => {
            let response = client
                .get(format!("{server}/health"))
                .send()
                .await
                .context("request failed")?;
            let body = check_json(response).await?;
            println!(
                "status: {}",
                body.get("status").and_then(|v| v.as_str()).unwrap_or("?")
            );
            println!(
                "faces: {}",
                body.get("faces").and_then(|v| v.as_u64()).unwrap_or(0)
            );
            println!(
                "stream running: {}",
                body.get("stream_running")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false)
            );
            println!(
                "buzzer: {}",
                body.get("buzzer").and_then(|v| v.as_bool()).unwrap_or(false)
            );
        }
        Command::Devices => {
            let devices = argus_hw::Camera::list_devices();
            if devices.is_empty() {
                println!("no capture devices found");
            } else {
                for dev in devices {
                    println!(
                        "{}  {} ({}, {})",
                        dev.path, dev.name, dev.driver, dev.bus
                    );
                }
            }
        }
        Command::Snapshot { device, output } => {
            let frame = tokio::task::spawn_blocking(move || {
                let camera = argus_hw::Camera::open(&device)?;
                camera.capture_frame()
            })
            .await
            .context("capture task failed")??;

            write_snapshot(&frame, &output)?;
            println!(
                "saved {}x{} frame to {}",
                frame.width,
                frame.height,
                output.display()
            );
        }
    }

    Ok(())
}

/// Encode a captured frame as JPEG at the given path.
fn write_snapshot(frame: &argus_hw::RgbFrame, path: &std::path::Path) -> anyhow::Result<()> {
    let image = image::RgbImage::from_raw(frame.width, frame.height, frame.data.clone())
        .context("frame buffer does not match its dimensions")?;
    image
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

async fn post_json(client: &reqwest::Client, url: &str) -> anyhow::Result<serde_json::Value> {
    let response = client.post(url).send().await.context("request failed")?;
    check_json(response).await
}

/// Parse the JSON body, turning non-2xx answers into errors that carry the
/// daemon's message.
async fn check_json(response: reqwest::Response) -> anyhow::Result<serde_json::Value> {
    let status = response.status();
    let body: serde_json::Value = response
        .json()
        .await
        .unwrap_or_else(|_| serde_json::json!({}));
    if !status.is_success() {
        bail!("{} ({status})", message_of(&body));
    }
    Ok(body)
}

fn message_of(body: &serde_json::Value) -> String {
    body.get("message")
        .and_then(|m| m.as_str())
        .unwrap_or("ok")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_snapshot_produces_jpeg() {
        let frame = argus_hw::RgbFrame {
            data: vec![90u8; 16 * 8 * 3],
            width: 16,
            height: 8,
            timestamp: std::time::Instant::now(),
            sequence: 0,
        };
        let path = std::env::temp_dir().join(format!(
            "argus-snapshot-{}-{:?}.jpg",
            std::process::id(),
            std::thread::current().id()
        ));

        write_snapshot(&frame, &path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_write_snapshot_rejects_short_buffer() {
        let frame = argus_hw::RgbFrame {
            data: vec![0u8; 10],
            width: 16,
            height: 8,
            timestamp: std::time::Instant::now(),
            sequence: 0,
        };
        let path = std::env::temp_dir().join("argus-snapshot-short.jpg");
        assert!(write_snapshot(&frame, &path).is_err());
    }
}
