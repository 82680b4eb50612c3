//! Built-in validation rules, one per file.

mod connections;
mod node_fields;
mod operation_type;
mod parameters;
mod required_fields;
mod settings;
mod tenant;
mod triggers;
mod unique_nodes;
mod variables;

pub use connections::ConnectionRule;
pub use node_fields::NodeFieldsRule;
pub use operation_type::OperationTypeRule;
pub use parameters::{ParameterRule, RESERVED_PARAMETER_KEYS, SERIALIZATION_FAILURE};
pub use required_fields::RequiredFieldsRule;
pub use settings::SettingsRule;
pub use tenant::TenantRule;
pub use triggers::TriggerRule;
pub use unique_nodes::UniqueNodesRule;
pub use variables::VariableRule;
