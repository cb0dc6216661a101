pub mod loaders;
pub mod options;
pub mod report;
pub mod stage;
pub mod track;

pub use loaders::load_track_definition;
pub use options::{OptionOverrides, PipelineOptions};
pub use report::{ItemRecord, ItemStatus, RunReport};
pub use stage::{RunMode, Stage, StageSelection};
pub use track::{FileJob, ResolvedJob, TrackDefaults, TrackDefinition};
