//! LINSTOR Attach - Quorum-Aware Volume Placement
//!
//! Decides and executes how a replicated block volume is made usable on a
//! node, and answers the capacity and topology questions a provisioner asks
//! of a LINSTOR cluster.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              Orchestrator                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────┐  ┌──────────────────┐  ┌──────────────────────┐   │
//! │  │    Attachment    │  │     Capacity     │  │      Topology        │   │
//! │  │      Engine      │  │    Aggregator    │  │      Resolver        │   │
//! │  └────────┬─────────┘  └────────┬─────────┘  └──────────┬───────────┘   │
//! │           │                     │                       │               │
//! │  ┌────────┴─────────┐           │           ┌───────────┴───────────┐   │
//! │  │    Placement     │           │           │ Remote Access Policy  │   │
//! │  │    Inspector     │           │           └───────────────────────┘   │
//! │  └────────┬─────────┘           │                       │               │
//! ├───────────┴─────────────────────┴───────────────────────┴───────────────┤
//! │                 Control Plane Ports (RequestContext)                     │
//! │  ┌──────────────────────────────┐  ┌──────────────────────────────────┐  │
//! │  │   LINSTOR REST client (v1)   │  │   In-memory control plane        │  │
//! │  └──────────────────────────────┘  └──────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`controlplane`]: Request context, control plane clients, orchestrator
//! - [`placement`]: Placement inspection, quorum and attachment
//! - [`capacity`]: Free capacity accounting and allocation sizing
//! - [`topology`]: Locality segments, remote access policy, node resolution
//! - [`volume`]: Resource naming and volume parameters
//! - [`domain`]: Wire types and control plane ports
//! - [`error`]: Error types and handling

pub mod capacity;
pub mod controlplane;
pub mod domain;
pub mod error;
pub mod placement;
pub mod topology;
pub mod volume;

// Re-export commonly used types
pub use controlplane::{
    LinstorClient, LinstorClientConfig, MemoryControlPlane, Orchestrator, OrchestratorConfig,
    RequestContext,
};

pub use domain::ports::{
    ControlPlane, LocalityPolicy, NodeProvider, ResourceProvider, Segments, StoragePoolProvider,
};

pub use error::{AttachStep, ControlPlaneError, Error, ErrorAction, Result};

pub use placement::{AttachConfig, AttachmentAction, PlacementView};

pub use topology::{RemoteAccessPolicy, NODE_KEY};

pub use volume::VolumeParameters;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
