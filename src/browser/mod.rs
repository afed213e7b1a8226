pub mod cdp;
pub mod surface;

pub use cdp::CdpClient;
pub use surface::{CdpSurface, MarkerToken, Surface, SurfaceSelectors};
