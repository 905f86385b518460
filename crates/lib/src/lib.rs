//! Shared data model for the Aika historian.
//!
//! Everything in this crate is plain data: samples, qualities, state sets,
//! tag and filter settings, write results and search filters. No I/O and no
//! async; the engine in `aika-core` and the backends build on top of these
//! types.

pub mod caller;
pub mod datafn;
pub mod error;
pub mod search;
pub mod settings;
pub mod state_set;
pub mod timestamp;
pub mod value;
pub mod write;

pub use caller::Caller;
pub use datafn::{Buckets, DataFunction};
pub use error::{Error, Result};
pub use search::{ClauseJoin, SearchClause, SearchField, TagSearchFilter};
pub use settings::{
    ChangeEntry, FilterSettings, FilterSettingsUpdate, LimitType, TagDataType, TagSettings,
    TagSettingsUpdate, DEFAULT_FILTER_WINDOW,
};
pub use state_set::{StateSet, StateSetItem};
pub use timestamp::Timestamp;
pub use value::{Quality, TagValue, TagValueCollection, VisualizationHint};
pub use write::WriteResult;
