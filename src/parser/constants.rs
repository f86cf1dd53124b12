pub const COLLECTION_FIELD: &str = "ac";
pub const ALTITUDE_ON_GROUND: &str = "ground";
