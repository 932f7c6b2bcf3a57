use anyhow::{Context, Result};
use rollcall_core::{
    ClassRosters, Gallery, GalleryHandle, OnnxCapability, RosterResolver, WholeGallery,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;
mod service;

use config::Config;
use service::{AttendanceService, ServiceSettings};

const BUS_NAME: &str = "org.rollcall.Attendance1";
const OBJECT_PATH: &str = "/org/rollcall/Attendance1";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("rollcalld starting");

    let config = Config::from_env();
    tracing::info!(
        model_dir = %config.model_dir.display(),
        corpus_dir = %config.corpus_dir.display(),
        artifact_dir = %config.artifact_dir.display(),
        threshold = config.match_threshold,
        "configuration loaded"
    );

    let capability = OnnxCapability::load(&config.scrfd_model_path(), &config.arcface_model_path())
        .context("failed to load ONNX models")?
        .with_max_faces(config.max_faces);
    let engine = engine::spawn_engine(capability)?;

    let rosters: Arc<dyn RosterResolver> = match &config.roster_path {
        Some(path) => Arc::new(ClassRosters::load(path).context("failed to load class rosters")?),
        None => {
            tracing::info!("no roster file configured; every class uses the whole gallery");
            Arc::new(WholeGallery)
        }
    };

    let service = AttendanceService::new(
        engine,
        GalleryHandle::new(Gallery::new()),
        rosters,
        ServiceSettings {
            corpus_dir: config.corpus_dir.clone(),
            artifact_dir: config.artifact_dir.clone(),
            match_threshold: config.match_threshold,
            request_timeout: config.request_timeout(),
        },
    );
    service
        .reload_gallery()
        .await
        .context("initial gallery load failed")?;

    let builder = if config.system_bus {
        zbus::connection::Builder::system()?
    } else {
        zbus::connection::Builder::session()?
    };
    let _conn = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, dbus_interface::AttendanceInterface { service })?
        .build()
        .await
        .context("failed to register on D-Bus")?;

    tracing::info!(bus = BUS_NAME, system_bus = config.system_bus, "rollcalld ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("rollcalld shutting down");

    Ok(())
}
