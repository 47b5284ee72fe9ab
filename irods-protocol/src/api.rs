//! API numbers carried in the header of a request.

/// General query.
pub const GEN_QUERY_AN: i32 = 702;
/// Named query registered on the server.
pub const SPECIFIC_QUERY_AN: i32 = 722;
/// Rule execution.
pub const EXEC_MY_RULE_AN: i32 = 625;
/// Features the server's library was built with.
pub const GET_LIBRARY_FEATURES_AN: i32 = 801;
/// Batch metadata update, applied all or nothing.
pub const ATOMIC_APPLY_METADATA_OPERATIONS_AN: i32 = 20002;
/// Batch permission update, applied all or nothing.
pub const ATOMIC_APPLY_ACL_OPERATIONS_AN: i32 = 20005;
/// Query in the second-generation query language.
pub const GENQUERY2_AN: i32 = 10221;

/// Keywords understood in a request's `KeyValPair_PI`.
pub mod keyword {
    /// Target zone of a query.
    pub const ZONE: &str = "zone";
    /// Rule engine plugin instance that runs a rule.
    pub const INSTANCE_NAME: &str = "instance_name";
    /// Asks the rule engine to list its plugin instances.
    pub const AVAILABLE: &str = "available";
}
