//! Record a synthetic test pattern to a `.y4m` file.
//!
//! ```text
//! RUST_LOG=info screen-record-synthetic --frames 120 --output-dir /tmp/rec
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;

use screen_record_core::models::config::RecordingConfiguration;
use screen_record_core::models::error::RecordError;
use screen_record_core::models::recording_result::RecordingResult;
use screen_record_core::session::recorder::ScreenRecorder;
use screen_record_software::{DirectoryExporter, SoftwareBackend, SyntheticCapture};

#[derive(Parser)]
#[command(name = "screen-record-synthetic")]
#[command(about = "Record a synthetic screen capture through the software pipeline")]
#[command(version)]
struct Cli {
    /// Output width in pixels (even)
    #[arg(long, default_value = "1280")]
    width: u32,

    /// Output height in pixels (even)
    #[arg(long, default_value = "720")]
    height: u32,

    /// Target bitrate in bits per second
    #[arg(long, default_value = "6000000")]
    bitrate: u32,

    /// Nominal frame rate
    #[arg(long, default_value = "60")]
    fps: u32,

    /// Number of frames to deliver before stopping
    #[arg(short, long, default_value = "10")]
    frames: u64,

    /// Delay between delivered frames in milliseconds
    #[arg(long, default_value = "16")]
    interval_ms: u64,

    /// Deliver this frame index and later ones with the content hidden
    #[arg(long)]
    hide_from: Option<u64>,

    /// Working directory for the recording
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// File name prefix
    #[arg(long, default_value = "ScreenRecording")]
    prefix: String,

    /// Move the finished recording into this directory
    #[arg(long)]
    export_dir: Option<PathBuf>,

    /// Skip the JSON metadata sidecar
    #[arg(long)]
    no_metadata: bool,
}

impl Cli {
    fn configuration(&self) -> RecordingConfiguration {
        RecordingConfiguration {
            width: self.width,
            height: self.height,
            video_bitrate: self.bitrate,
            frame_rate: self.fps,
            output_directory: self.output_dir.clone(),
            file_prefix: self.prefix.clone(),
            write_metadata: !self.no_metadata,
            ..Default::default()
        }
    }
}

fn record(cli: &Cli) -> Result<RecordingResult, RecordError> {
    let mut recorder = ScreenRecorder::new(Arc::new(SoftwareBackend), cli.configuration());
    if let Some(ref dir) = cli.export_dir {
        recorder.set_exporter(Arc::new(DirectoryExporter::new(dir).with_sub_folder("ScreenRecordings")));
    }

    let (capture, controller) = SyntheticCapture::new("synthetic display");
    recorder.start_record(capture)?;

    for index in 0..cli.frames {
        if cli.hide_from == Some(index) {
            controller.set_content_visible(false);
        }
        controller.deliver_pattern();
        thread::sleep(Duration::from_millis(cli.interval_ms));
    }

    recorder.stop_record()
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match record(&cli) {
        Ok(result) => {
            let path = result.exported_path.as_ref().unwrap_or(&result.file_path);
            println!(
                "{} ({} frames, {:.2}s, sha256 {})",
                path.display(),
                result.frames_encoded,
                result.duration_secs,
                result.checksum
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("recording failed: {}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
