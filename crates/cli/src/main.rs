use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::thread;

use clap::Parser;

use facescan_core::detection::infrastructure::configured_detector_factory::ConfiguredDetectorFactory;
use facescan_core::imaging::infrastructure::image_file_reader::ImageFileReader;
use facescan_core::pipeline::detection_report::DetectionReport;
use facescan_core::pipeline::processor::{Processor, ProcessorOptions};
use facescan_core::shared::constants::{
    DEFAULT_DETECTOR_DESCRIPTION_FILE_NAME, DEFAULT_WORKER_NUMBER, MAX_POOL_SIZE,
    MAX_WORKER_COUNT,
};

/// Batch face detection over a folder of images.
#[derive(Parser, Debug)]
#[command(name = "facescan")]
struct Cli {
    /// Folder scanned recursively for images.
    #[arg(short = 'i', long)]
    images_dir: PathBuf,

    /// Detector description (JSON with "type" and "settings").
    #[arg(short = 'd', long, default_value = DEFAULT_DETECTOR_DESCRIPTION_FILE_NAME)]
    detector_description_file: PathBuf,

    /// Number of detector worker threads.
    #[arg(short = 'w', long, default_value_t = DEFAULT_WORKER_NUMBER)]
    workers_number: usize,

    /// Maximum number of images waiting for a worker.
    #[arg(long, default_value_t = MAX_POOL_SIZE)]
    queue_capacity: usize,

    /// JSON-lines output file (stdout when omitted).
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    let options = ProcessorOptions {
        max_workers: MAX_WORKER_COUNT,
        queue_capacity: cli.queue_capacity,
        admission_timeout: None,
    };
    let mut processor = Processor::with_options(
        Box::new(ConfiguredDetectorFactory::new()),
        Box::new(ImageFileReader::new()),
        options,
    );

    if let Err(e) = processor.init(cli.workers_number, &cli.detector_description_file) {
        log::error!("Initialization failed: {}", e.status_code());
        return Err(e.into());
    }

    let output = open_output(cli.output.as_deref())?;
    let (report_tx, report_rx) = crossbeam_channel::unbounded::<DetectionReport>();
    let writer = spawn_writer(output, report_rx);

    let result = processor.process(&cli.images_dir, |path, detections| {
        // The writer only goes away after a write error, which is reported below.
        let _ = report_tx.send(DetectionReport::new(path, detections));
    });
    drop(report_tx);

    let written = writer
        .join()
        .map_err(|_| "report writer thread panicked")??;

    match result {
        Ok(summary) => {
            log::info!(
                "Wrote {written} report(s); {} skipped, {} failed, {} dropped",
                summary.skipped,
                summary.failed,
                summary.dropped
            );
            Ok(())
        }
        Err(e) => {
            log::error!("Processing failed: {}", e.status_code());
            Err(e.into())
        }
    }
}

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write + Send>, Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .map_err(|e| format!("Cannot create output file {}: {e}", path.display()))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(BufWriter::new(io::stdout()))),
    }
}

/// Serializes reports one JSON object per line, in arrival order.
fn spawn_writer(
    mut output: Box<dyn Write + Send>,
    report_rx: crossbeam_channel::Receiver<DetectionReport>,
) -> thread::JoinHandle<io::Result<usize>> {
    thread::spawn(move || {
        let mut written = 0;
        for report in report_rx {
            serde_json::to_writer(&mut output, &report)?;
            output.write_all(b"\n")?;
            written += 1;
        }
        output.flush()?;
        Ok(written)
    })
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if !cli.images_dir.is_dir() {
        return Err(format!("Images folder not found: {}", cli.images_dir.display()).into());
    }
    if cli.workers_number == 0 || cli.workers_number > MAX_WORKER_COUNT {
        return Err(format!(
            "Workers number must be between 1 and {MAX_WORKER_COUNT}, got {}",
            cli.workers_number
        )
        .into());
    }
    if cli.queue_capacity == 0 {
        return Err("Queue capacity must be positive".into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["facescan", "-i", "photos"]).unwrap();
        assert_eq!(cli.images_dir, PathBuf::from("photos"));
        assert_eq!(
            cli.detector_description_file,
            PathBuf::from(DEFAULT_DETECTOR_DESCRIPTION_FILE_NAME)
        );
        assert_eq!(cli.workers_number, DEFAULT_WORKER_NUMBER);
        assert_eq!(cli.queue_capacity, MAX_POOL_SIZE);
        assert!(cli.output.is_none());
    }

    #[test]
    fn test_images_dir_is_required() {
        assert!(Cli::try_parse_from(["facescan"]).is_err());
    }

    #[test]
    fn test_validate_rejects_worker_number_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().to_string_lossy().into_owned();
        let cli = Cli::try_parse_from(["facescan", "-i", images.as_str(), "-w", "11"]).unwrap();
        assert!(validate(&cli).is_err());
        let cli = Cli::try_parse_from(["facescan", "-i", images.as_str(), "-w", "3"]).unwrap();
        assert!(validate(&cli).is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_images_dir() {
        let cli = Cli::try_parse_from(["facescan", "-i", "/nonexistent/photos"]).unwrap();
        assert!(validate(&cli).is_err());
    }

    #[test]
    fn test_writer_emits_one_json_line_per_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        let output = open_output(Some(&path)).unwrap();
        let (tx, rx) = crossbeam_channel::unbounded();
        let writer = spawn_writer(output, rx);

        tx.send(DetectionReport::new(Path::new("a.jpg"), &[])).unwrap();
        tx.send(DetectionReport::new(Path::new("b.jpg"), &[])).unwrap();
        drop(tx);

        assert_eq!(writer.join().unwrap().unwrap(), 2);
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], r#"{"image_path":"a.jpg","detections":[]}"#);
    }
}
