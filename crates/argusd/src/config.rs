use std::net::SocketAddr;
use std::path::PathBuf;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// HTTP bind address (default: 0.0.0.0:4000).
    pub bind_addr: String,
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Base URL of a remote camera host. When set, start/stop are proxied
    /// there and frames are pulled from its /video_feed instead of the
    /// local camera.
    pub upstream_url: Option<String>,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Path to the persisted face store.
    pub store_path: PathBuf,
    /// Euclidean distance threshold for a positive match.
    pub match_threshold: f32,
    /// Minimum detector face-class score.
    pub detector_confidence: f32,
    /// Detector NMS IoU threshold.
    pub detector_nms: f32,
    /// Minimum detected face side, pixels.
    pub min_face_size: u32,
    /// JPEG quality for the annotated output stream.
    pub jpeg_quality: u8,
    /// GPIO chip device for the buzzer.
    pub buzzer_chip: String,
    /// GPIO line offset for the buzzer (BCM 18 in the reference wiring).
    pub buzzer_line: u32,
    /// Buzzer pulse duration in milliseconds.
    pub buzzer_pulse_ms: u64,
}

impl Config {
    /// Load configuration from `ARGUS_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("ARGUS_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("models"));

        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("argus");

        let store_path = std::env::var("ARGUS_STORE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("faces.json"));

        Self {
            bind_addr: std::env::var("ARGUS_BIND")
                .unwrap_or_else(|_| "0.0.0.0:4000".to_string()),
            camera_device: std::env::var("ARGUS_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            upstream_url: std::env::var("ARGUS_UPSTREAM_URL")
                .ok()
                .map(|u| u.trim_end_matches('/').to_string()),
            model_dir,
            store_path,
            match_threshold: env_f32("ARGUS_MATCH_THRESHOLD", 0.7),
            detector_confidence: env_f32("ARGUS_DETECTOR_CONFIDENCE", 0.7),
            detector_nms: env_f32("ARGUS_DETECTOR_NMS", 0.3),
            min_face_size: env_u32("ARGUS_MIN_FACE_SIZE", 30),
            jpeg_quality: env_u32("ARGUS_JPEG_QUALITY", 80).min(100) as u8,
            buzzer_chip: std::env::var("ARGUS_BUZZER_CHIP")
                .unwrap_or_else(|_| "/dev/gpiochip0".to_string()),
            buzzer_line: env_u32("ARGUS_BUZZER_LINE", 18),
            buzzer_pulse_ms: env_u64("ARGUS_BUZZER_PULSE_MS", 1000),
        }
    }

    /// Path to the face detection model.
    pub fn detector_model_path(&self) -> String {
        self.model_dir
            .join("version-RFB-320.onnx")
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the face embedding model.
    pub fn embedder_model_path(&self) -> String {
        self.model_dir
            .join("facenet-128.onnx")
            .to_string_lossy()
            .into_owned()
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.bind_addr.parse()
    }

    /// The upstream's MJPEG feed URL, when a remote camera host is configured.
    pub fn upstream_feed_url(&self) -> Option<String> {
        self.upstream_url.as_ref().map(|u| format!("{u}/video_feed"))
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
