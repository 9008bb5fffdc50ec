mod filesystem;
mod location;
mod memory;
mod tiers;
mod traits;

pub use filesystem::{FileStore, StoredEntry};
pub use location::SimulatedLocation;
pub use memory::MemoryStore;
pub use tiers::{
    fragment_param, query_param, with_query_param, SlotValue, StorageTiers, Tier,
    LOCAL_DENSE_KEY, LOCAL_TOKEN_KEY, SESSION_DENSE_KEY, SESSION_STASH_KEY, STATE_PARAM,
};
pub use traits::{KeyValueStore, Location};
