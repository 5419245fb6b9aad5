//! HTTP surface: thin request/response handlers over the core services.

mod collage;
mod faces;
mod health;
mod scan;

pub use collage::collage_routes;
pub use faces::{face_routes, FaceItem, FacesResponse};
pub use health::health_routes;
pub use scan::{scan_routes, ScanRequest, ScanResponse};
