use const_format::concatcp;

/// The application name Ranger is deployed under. Used to decide between plain HTTP and HTTPS
/// when advertising the policy manager.
pub const APP_NAME: &str = "ranger-k8s";

pub const APPLICATION_PORT: u16 = 6080;

pub const DEFAULT_RANGER_URL: &str = concatcp!("http://localhost:", APPLICATION_PORT);

pub const ADMIN_USER: &str = "admin";

/// Groups managed by Ranger itself. They are never deleted, regardless of the desired state.
pub const SYSTEM_GROUPS: &[&str] = &["public"];

/// The keys every scope of the user-group configuration must contain.
pub const EXPECTED_KEYS: [&str; 3] = ["users", "groups", "memberships"];

/// Key of the [`IdMapping`](crate::id_mapping::IdMapping) blob in the persisted state.
pub const ID_MAPPING_STATE_KEY: &str = "id_mapping";

pub const POLICY_RELATION_NAME: &str = "policy";
pub const SERVICE_NAME_RELATION_KEY: &str = "service_name";
pub const USER_GROUP_CONFIGURATION_RELATION_KEY: &str = "user-group-configuration";
pub const POLICY_MANAGER_URL_RELATION_KEY: &str = "policy_manager_url";

pub const USER_PASSWORD_LENGTH: usize = 12;
