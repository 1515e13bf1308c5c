pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_DESCRIPTION_LEN: usize = 2000;
pub const MAX_NAME_LEN: usize = 256;
pub const MAX_FEATURES: usize = 32;
pub const MAX_FEATURE_LEN: usize = 64;
pub const MAX_SEARCH_LEN: usize = 256;
pub const MAX_RESOURCES: usize = 10_000;
pub const MAX_BOOKINGS_PER_RESOURCE: usize = 100_000;
pub const MAX_CAPACITY: u32 = 1_000_000;
