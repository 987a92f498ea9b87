//! Content normalization and live preview reconciliation for livepage.
//!
//! Entries fetched from the content store are reduced to render-ready
//! [`PageProps`](livepage_shared::PageProps) by [`mapper::map_entry`]. In
//! preview mode, [`live::PreviewSession`] keeps the live channel's copies of
//! every reachable entry and re-runs [`reconcile::reconcile_live`] on each
//! update before mapping.

pub mod graph;
pub mod live;
pub mod mapper;
pub mod paths;
pub mod preview;
pub mod reconcile;
pub mod sections;
pub mod transform;

pub use graph::{extract_graph, watch_list};
pub use live::{LiveSnapshot, LiveUpdate, PreviewSession, run_session};
pub use mapper::{MapperConfig, is_static_page, map_entry};
pub use preview::PreviewRequest;
pub use reconcile::{
    EntryIndex, INDEX_OVERWRITE_POLICY, OverwritePolicy, ReconcileOptions, reconcile_live,
};
pub use sections::{SectionAliases, SectionDescriptor};
