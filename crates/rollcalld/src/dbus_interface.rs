use crate::service::{AttendanceService, ProcessError};
use rollcall_core::ArtifactError;
use zbus::interface;

/// D-Bus interface for the attendance daemon.
///
/// Bus name: org.rollcall.Attendance1
/// Object path: /org/rollcall/Attendance1
pub struct AttendanceInterface {
    pub service: AttendanceService,
}

#[interface(name = "org.rollcall.Attendance1")]
impl AttendanceInterface {
    /// Take attendance for a class from one photo. Returns the response as JSON.
    async fn process_photo(&self, class_id: &str, photo: Vec<u8>) -> zbus::fdo::Result<String> {
        tracing::info!(class_id, bytes = photo.len(), "process_photo requested");
        let response = self.service.process(class_id, photo).await.map_err(to_fdo)?;
        to_json(&response)
    }

    /// Path of the latest annotated image for a class.
    async fn annotated_image(&self, class_id: &str) -> zbus::fdo::Result<String> {
        let path = self.service.annotated_image(class_id).map_err(to_fdo)?;
        Ok(path.display().to_string())
    }

    /// Roster the class resolves to, as a JSON array.
    async fn roster(&self, class_id: &str) -> zbus::fdo::Result<String> {
        let roster = self.service.roster(class_id).map_err(to_fdo)?;
        to_json(&roster)
    }

    /// Enrolled identities, as a JSON array.
    async fn list_identities(&self) -> zbus::fdo::Result<String> {
        to_json(&self.service.identities())
    }

    /// Rebuild the gallery from the training corpus.
    async fn reload_gallery(&self) -> zbus::fdo::Result<u32> {
        tracing::info!("reload_gallery requested");
        let report = self.service.reload_gallery().await.map_err(to_fdo)?;
        Ok(report.enrolled as u32)
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        to_json(&self.service.status())
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value)
        .map_err(|e| zbus::fdo::Error::Failed(format!("serialization failed: {e}")))
}

fn to_fdo(e: ProcessError) -> zbus::fdo::Error {
    match &e {
        ProcessError::Artifact(ArtifactError::NotFound(_)) => {
            zbus::fdo::Error::FileNotFound(e.to_string())
        }
        _ if e.is_input_error() => zbus::fdo::Error::InvalidArgs(e.to_string()),
        _ => {
            tracing::warn!(error = %e, "request failed");
            zbus::fdo::Error::Failed(e.to_string())
        }
    }
}
