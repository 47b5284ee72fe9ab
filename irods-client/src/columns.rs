//! Catalog column identifiers for general queries.

// Zones
pub const COL_ZONE_ID: i32 = 101;
pub const COL_ZONE_NAME: i32 = 102;
pub const COL_ZONE_TYPE: i32 = 103;
pub const COL_ZONE_CONNECTION: i32 = 104;

// Users
pub const COL_USER_ID: i32 = 201;
pub const COL_USER_NAME: i32 = 202;
pub const COL_USER_TYPE: i32 = 203;
pub const COL_USER_ZONE: i32 = 204;
pub const COL_USER_CREATE_TIME: i32 = 208;
pub const COL_USER_MODIFY_TIME: i32 = 209;

// Resources
pub const COL_R_RESC_ID: i32 = 301;
pub const COL_R_RESC_NAME: i32 = 302;
pub const COL_R_ZONE_NAME: i32 = 303;
pub const COL_R_TYPE_NAME: i32 = 304;
pub const COL_R_LOC: i32 = 306;
pub const COL_R_VAULT_PATH: i32 = 307;
pub const COL_R_RESC_PARENT: i32 = 317;

// Data objects
pub const COL_D_DATA_ID: i32 = 401;
pub const COL_D_COLL_ID: i32 = 402;
pub const COL_DATA_NAME: i32 = 403;
pub const COL_DATA_REPL_NUM: i32 = 404;
pub const COL_DATA_SIZE: i32 = 407;
pub const COL_D_RESC_NAME: i32 = 409;
pub const COL_D_DATA_PATH: i32 = 410;
pub const COL_D_OWNER_NAME: i32 = 411;
pub const COL_D_OWNER_ZONE: i32 = 412;
pub const COL_D_REPL_STATUS: i32 = 413;
pub const COL_D_DATA_CHECKSUM: i32 = 415;
pub const COL_D_CREATE_TIME: i32 = 419;
pub const COL_D_MODIFY_TIME: i32 = 420;
pub const COL_D_RESC_HIER: i32 = 422;
pub const COL_D_RESC_ID: i32 = 423;

// Collections
pub const COL_COLL_ID: i32 = 500;
pub const COL_COLL_NAME: i32 = 501;
pub const COL_COLL_PARENT_NAME: i32 = 502;
pub const COL_COLL_OWNER_NAME: i32 = 503;
pub const COL_COLL_OWNER_ZONE: i32 = 504;
pub const COL_COLL_INHERITANCE: i32 = 506;
pub const COL_COLL_CREATE_TIME: i32 = 508;
pub const COL_COLL_MODIFY_TIME: i32 = 509;

// Metadata attached to data objects
pub const COL_META_DATA_ATTR_NAME: i32 = 600;
pub const COL_META_DATA_ATTR_VALUE: i32 = 601;
pub const COL_META_DATA_ATTR_UNITS: i32 = 602;
pub const COL_META_DATA_ATTR_ID: i32 = 603;

// Metadata attached to collections
pub const COL_META_COLL_ATTR_NAME: i32 = 610;
pub const COL_META_COLL_ATTR_VALUE: i32 = 611;
pub const COL_META_COLL_ATTR_UNITS: i32 = 612;
pub const COL_META_COLL_ATTR_ID: i32 = 613;
