pub mod coordinate;
pub mod deferred;
pub mod geometry;
pub mod scene;
pub mod snapshot;
pub mod status;
pub mod sync;

pub use coordinate::{Coordinate, CoordinateParseError};
pub use deferred::DeferredSlot;
pub use geometry::{
    block_center, map_snapshot, material_texture_name, material_texture_path, place_agent,
    AgentTransform, FaceDirection, FaceRotation, RenderableFace, BLOCK_NAMESPACE_PREFIX,
    DEFAULT_FACE_OPACITY, FACE_HALF_EXTENT, MODEL_YAW_OFFSET,
};
pub use scene::SceneState;
pub use snapshot::{AgentState, Facing, WorldSnapshot};
pub use status::{
    AgentPose, BlockDescriptor, BlockEntry, CommandResponse, SetTurtleResponse, StatusResponse,
    TurtleCollection, TurtleRecord, COMMAND_SENT_FALLBACK, SELECT_TURTLE_FALLBACK_ERROR,
};
pub use sync::{
    CommandGeneration, CommandOutcome, GenerationTicket, HttpStatusTransport, PollPacer,
    PollPolicy, SelectOutcome, StatusTransport, SyncClient, SyncError, SyncEvent, ThreadPacer,
    COMMAND_ERROR_MESSAGE, DEFAULT_MAX_POLL_ATTEMPTS, DEFAULT_POLL_INTERVAL,
    REFRESH_ERROR_MESSAGE,
};
