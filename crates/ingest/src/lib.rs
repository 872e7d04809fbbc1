mod clock;
mod error;
mod locks;
mod pipeline;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Collaborator, IngestError};
pub use locks::DeviceLocks;
pub use pipeline::{ConsistencyMode, IngestPipeline, IngestReport, SideEffect};
