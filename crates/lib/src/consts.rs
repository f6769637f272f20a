/// Application name, used for data/config directory names.
pub const APP_NAME: &str = "topo";

/// Environment variable that overrides the data root.
pub const ROOT_ENV: &str = "TOPO_ROOT";

/// Length of the truncated hashes used for revision ids.
pub const OBJ_HASH_PREFIX_LEN: usize = 20;

/// Directory (below the root) holding one revision history per system.
pub const SYSTEMS_DIR: &str = "systems";

/// Directory (below the root) holding the version-controlled registry.
pub const REGISTRY_DIR: &str = "registry";

/// Registry document file name.
pub const REGISTRY_FILENAME: &str = "systems.json";

/// Config file name inside the config directory.
pub const CONFIG_FILENAME: &str = "config.json";
