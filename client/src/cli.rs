//! Subcommand implementations

use crate::Cmd;
use anyhow::{Context, Result, bail};
use halot_client::{
    ClientConfig, Event, EventKind, EventSubscription, PrintParameters, PrinterStatus,
    ProtocolClient, camera_video_uri,
};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

const FILE_EXTENSION: &str = "cxdlpv4";

pub async fn run(config: ClientConfig, command: Cmd, timeout: Duration) -> Result<()> {
    if let Cmd::Camera = command {
        println!("{}", camera_video_uri(&config.printer.address));
        return Ok(());
    }

    let client = ProtocolClient::with_config(config);
    client
        .connect()
        .await
        .with_context(|| format!("failed to connect to {}", client.address()))?;

    let result = execute(&client, command, timeout).await;
    client.dispose().await;
    result
}

async fn execute(client: &ProtocolClient, command: Cmd, timeout: Duration) -> Result<()> {
    match command {
        Cmd::Version => {
            let mut events = client.subscribe_to(&[EventKind::Version]);
            client.check_version().await?;
            match expect(&mut events, timeout).await? {
                Event::Version(version) => println!("{}", version),
                other => bail!("unexpected reply: {:?}", other),
            }
        }
        Cmd::Status => {
            let status = request_status(client, timeout).await?;
            print_status(&status)?;
        }
        Cmd::Start { filename } => {
            let mut events = client.subscribe_to(&[EventKind::PrintStarted]);
            client.start_print(&filename).await?;
            match expect(&mut events, timeout).await? {
                Event::PrintStarted(ack) if ack.is_started() => {
                    info!("Printing {}", ack.filename);
                }
                Event::PrintStarted(ack) => {
                    bail!("printer refused to start {}: {}", ack.filename, ack.status)
                }
                other => bail!("unexpected reply: {:?}", other),
            }
        }
        Cmd::Stop => {
            let mut events = client.subscribe_to(&[EventKind::PrintStopped]);
            client.stop_print().await?;
            expect_ack(&mut events, timeout, "stop").await?;
        }
        Cmd::Pause => {
            let mut events = client.subscribe_to(&[EventKind::PrintPaused]);
            client.pause_print().await?;
            expect_ack(&mut events, timeout, "pause").await?;
        }
        Cmd::Resume => {
            let mut events = client.subscribe_to(&[EventKind::PrintPaused]);
            client.resume_print().await?;
            expect_ack(&mut events, timeout, "resume").await?;
        }
        Cmd::SetParams {
            bottom_layers,
            light_off_delay,
            motor_speed,
            initial_exposure,
            exposure,
            rising_height,
        } => {
            let params = PrintParameters {
                bottom_exposure_layers: bottom_layers,
                light_off_delay,
                motor_speed,
                initial_exposure,
                print_exposure: exposure,
                rising_height,
            };
            let mut events = client.subscribe_to(&[EventKind::ParameterSet]);
            client.set_print_parameter(params).await?;
            expect_ack(&mut events, timeout, "set parameters").await?;
        }
        Cmd::Send { path, name } => send(client, &path, name, timeout).await?,
        Cmd::Watch { interval } => watch(client, Duration::from_secs(interval.max(1))).await?,
        Cmd::Camera => println!("{}", client.camera_video_uri()),
    }

    Ok(())
}

async fn expect(events: &mut EventSubscription, timeout: Duration) -> Result<Event> {
    events
        .recv_timeout(timeout)
        .await
        .with_context(|| format!("no reply within {:?}", timeout))
}

async fn expect_ack(events: &mut EventSubscription, timeout: Duration, what: &str) -> Result<()> {
    let ack = match expect(events, timeout).await? {
        Event::PrintPaused(ack) | Event::PrintStopped(ack) | Event::ParameterSet(ack) => ack,
        other => bail!("unexpected reply: {:?}", other),
    };

    if !ack.succeeded() {
        bail!("printer rejected {}: {}", what, ack.status);
    }
    info!("Printer accepted {}", what);
    Ok(())
}

async fn request_status(client: &ProtocolClient, timeout: Duration) -> Result<std::sync::Arc<PrinterStatus>> {
    let mut events = client.subscribe_to(&[EventKind::Status, EventKind::TokenRejected]);
    client.get_printer_status().await?;

    match expect(&mut events, timeout).await? {
        Event::Status(status) => Ok(status),
        Event::TokenRejected => bail!("printer rejected the password"),
        other => bail!("unexpected reply: {:?}", other),
    }
}

fn print_status(status: &PrinterStatus) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(status)?);
    Ok(())
}

async fn send(client: &ProtocolClient, path: &Path, name: Option<String>, timeout: Duration) -> Result<()> {
    let filename = match name {
        Some(name) => name,
        None => path
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_owned)
            .with_context(|| format!("cannot derive a file name from {}", path.display()))?,
    };

    if Path::new(&filename).extension().and_then(|ext| ext.to_str()) != Some(FILE_EXTENSION) {
        warn!("{} does not look like a .{} file", filename, FILE_EXTENSION);
    }

    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut events = client.subscribe_to(&[
        EventKind::FileTransferStarted,
        EventKind::FileTransferProgress,
        EventKind::FileChecked,
        EventKind::Disconnected,
    ]);
    let key = client.send_file(&filename, file).await?;

    loop {
        let event = expect(&mut events, timeout).await?;
        if let Event::Disconnected(info) = &event {
            bail!("connection lost during upload: {}", info.reason);
        }
        if event.transfer_key() != Some(key.as_str()) {
            continue;
        }

        match event {
            Event::FileTransferStarted(transfer) if !transfer.is_ok() => {
                bail!("printer refused the upload (error {})", transfer.error_code)
            }
            Event::FileTransferStarted(transfer) => {
                info!("Upload of {} accepted ({} bytes)", transfer.filename, transfer.size);
            }
            Event::FileTransferProgress(progress) if !progress.is_ok() => {
                bail!("upload failed (error {})", progress.error_code)
            }
            Event::FileTransferProgress(progress) => {
                info!("Uploaded {:.0}%", progress.fraction() * 100.0);
            }
            Event::FileChecked(check) if check.is_ok() => {
                println!("{}", filename);
                return Ok(());
            }
            Event::FileChecked(check) => bail!("file check failed (state {})", check.check_state),
            _ => {}
        }
    }
}

async fn watch(client: &ProtocolClient, interval: Duration) -> Result<()> {
    let mut events = client.subscribe_to(&[
        EventKind::Status,
        EventKind::TokenRejected,
        EventKind::Disconnected,
    ]);
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                return Ok(());
            }
            _ = ticker.tick() => {
                if let Err(e) = client.get_printer_status().await {
                    warn!("Status request failed: {}", e);
                }
            }
            event = events.recv() => match event {
                Some(Event::Status(status)) => {
                    if client.status().status_changed() {
                        info!("Printer status: {}", status.print_status);
                    }
                    if let Some(progress) = status.progress() {
                        info!(
                            "Layer {}/{} ({:.1}%), {}s remaining",
                            status.current_slice_layer.unwrap_or(0),
                            status.slice_layer_count.unwrap_or(0),
                            progress * 100.0,
                            status.print_remain_time.unwrap_or(0)
                        );
                    }
                }
                Some(Event::TokenRejected) => bail!("printer rejected the password"),
                Some(Event::Disconnected(info)) if info.terminal => {
                    bail!("connection closed: {}", info.reason)
                }
                Some(_) => {}
                None => return Ok(()),
            },
        }
    }
}
