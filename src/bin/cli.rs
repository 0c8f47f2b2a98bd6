use anyhow::{bail, Context, Result};
use crabsnap::config::CrabSnapConfig;
use crabsnap::{
    BinaryFile, CameraError, CapturedImage, DeviceCatalog, FacingMode, LifecycleCoordinator,
    MediaBackend, NativeBackend,
};
use std::env;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

const USAGE: &str = "Usage: crabsnap-cli <command> [args]

Commands:
  list-devices [--json]
  capture [--device ID] [--facing front|back] [--out PATH] [--timeout MS] [--config PATH]";

#[tokio::main]
async fn main() -> Result<()> {
    crabsnap::init_logging();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("{}", USAGE);
        std::process::exit(1);
    }

    match args[1].as_str() {
        "list-devices" => cmd_list_devices(&args).await,
        "capture" => cmd_capture(&args).await,
        other => {
            eprintln!("Unknown command: {}\n\n{}", other, USAGE);
            std::process::exit(1);
        }
    }
}

async fn cmd_list_devices(args: &[String]) -> Result<()> {
    let backend = NativeBackend::new();
    if !backend.is_supported() {
        bail!("no native camera backend on this platform");
    }
    backend
        .request_permission()
        .await
        .map_err(CameraError::from)
        .context("camera access refused")?;

    let devices = DeviceCatalog::enumerate(&backend).await;
    if args.iter().any(|a| a == "--json") {
        println!("{}", serde_json::to_string(&devices)?);
    } else if devices.is_empty() {
        println!("No cameras found");
    } else {
        for d in devices {
            println!("{}: {} ({:?})", d.id, d.label, d.facing);
        }
    }
    Ok(())
}

struct CaptureArgs {
    device: Option<String>,
    facing: Option<FacingMode>,
    out: PathBuf,
    timeout: Duration,
    config: PathBuf,
}

fn parse_capture_args(args: &[String]) -> Result<CaptureArgs> {
    let mut parsed = CaptureArgs {
        device: None,
        facing: None,
        out: PathBuf::from("capture.jpg"),
        timeout: Duration::from_secs(10),
        config: CrabSnapConfig::default_path(),
    };

    let mut i = 2;
    while i < args.len() {
        let flag = args[i].as_str();
        let value = args
            .get(i + 1)
            .with_context(|| format!("{} needs a value", flag))?;
        match flag {
            "--device" => parsed.device = Some(value.clone()),
            "--facing" => {
                parsed.facing = Some(value.parse::<FacingMode>().map_err(anyhow::Error::msg)?)
            }
            "--out" => parsed.out = PathBuf::from(value),
            "--timeout" => {
                let ms: u64 = value.parse().context("--timeout expects milliseconds")?;
                parsed.timeout = Duration::from_millis(ms);
            }
            "--config" => parsed.config = PathBuf::from(value),
            _ => bail!("unknown option {}", flag),
        }
        i += 2;
    }
    Ok(parsed)
}

async fn open_and_wait(
    camera: &mut LifecycleCoordinator<NativeBackend>,
    timeout: Duration,
) -> Result<(), CameraError> {
    camera.open().await?;
    camera.wait_for_stable(timeout).await
}

async fn cmd_capture(args: &[String]) -> Result<()> {
    let opts = parse_capture_args(args)?;

    let mut config = CrabSnapConfig::load_layered(&opts.config)?;
    if let Some(facing) = opts.facing {
        config.stream.preferred_facing = facing;
    }

    let mut camera = LifecycleCoordinator::new(NativeBackend::new(), config)?;
    camera.set_preferred_device(opts.device);
    camera.on_state_change(|state| log::info!("Camera state: {}", state));

    let slot: Arc<Mutex<Option<(CapturedImage, BinaryFile)>>> = Arc::new(Mutex::new(None));
    let delivered = slot.clone();
    camera.on_capture(move |image, file| {
        if let (Some(image), Some(file)) = (image, file) {
            if let Ok(mut slot) = delivered.lock() {
                *slot = Some((image, file));
            }
        }
    });

    let interrupted = Arc::new(Notify::new());
    let handler = interrupted.clone();
    ctrlc::set_handler(move || handler.notify_one()).context("failed to install Ctrl-C handler")?;

    let ready = tokio::select! {
        result = open_and_wait(&mut camera, opts.timeout) => Some(result),
        _ = interrupted.notified() => None,
    };

    let Some(result) = ready else {
        camera.skip();
        println!("Interrupted, nothing captured");
        return Ok(());
    };
    if let Err(e) = result {
        camera.close();
        let guidance = e.user_message();
        return Err(e).context(guidance);
    }

    camera.capture()?;

    let captured = slot
        .lock()
        .map_err(|_| anyhow::anyhow!("capture handler panicked"))?
        .take();
    let Some((image, file)) = captured else {
        bail!("camera closed without delivering an image");
    };

    std::fs::write(&opts.out, &file.bytes)
        .with_context(|| format!("failed to write {}", opts.out.display()))?;
    println!(
        "Saved {}x{} JPEG ({} bytes) to {}",
        image.width,
        image.height,
        file.size(),
        opts.out.display()
    );
    Ok(())
}
