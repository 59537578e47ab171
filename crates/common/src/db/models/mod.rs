//! SeaORM entity models
//!
//! Database entities for the MDL model repository

pub(crate) mod artifact;
pub(crate) mod classification_metric;
pub(crate) mod descriptor;
pub(crate) mod method;
pub(crate) mod model;
pub(crate) mod modelset;
pub(crate) mod property;
pub(crate) mod regression_metric;
pub(crate) mod user;

pub use user::{
    Entity as UserEntity,
    Model as User,
    ActiveModel as UserActiveModel,
    Column as UserColumn,
};

pub use model::{
    Entity as ModelEntity,
    Model as MlModel,
    ActiveModel as ModelActiveModel,
    Column as ModelColumn,
};

pub use artifact::{
    Entity as ArtifactEntity,
    Model as Artifact,
    ActiveModel as ArtifactActiveModel,
    Column as ArtifactColumn,
};

pub use method::{
    Entity as MethodEntity,
    Model as Method,
    ActiveModel as MethodActiveModel,
    Column as MethodColumn,
};

pub use property::{
    Entity as PropertyEntity,
    Model as Property,
    ActiveModel as PropertyActiveModel,
    Column as PropertyColumn,
};

pub use descriptor::{
    Entity as DescriptorEntity,
    Model as Descriptor,
    ActiveModel as DescriptorActiveModel,
    Column as DescriptorColumn,
};

pub use modelset::{
    Entity as ModelsetEntity,
    Model as Modelset,
    ActiveModel as ModelsetActiveModel,
    Column as ModelsetColumn,
};

pub use regression_metric::{
    Entity as RegressionMetricEntity,
    Model as RegressionMetric,
    ActiveModel as RegressionMetricActiveModel,
    Column as RegressionMetricColumn,
};

pub use classification_metric::{
    Entity as ClassificationMetricEntity,
    Model as ClassificationMetric,
    ActiveModel as ClassificationMetricActiveModel,
    Column as ClassificationMetricColumn,
};

/// Role stored on a user row
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
}

impl From<&str> for Role {
    fn from(s: &str) -> Self {
        match s {
            "admin" => Role::Admin,
            _ => Role::User,
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        match role {
            Role::User => "user".to_string(),
            Role::Admin => "admin".to_string(),
        }
    }
}

impl User {
    /// Get the role as an enum
    pub fn role(&self) -> Role {
        Role::from(self.role.as_str())
    }
}

/// A model's metric, a model has at most one kind
#[derive(Clone, Debug, PartialEq)]
pub enum Metric {
    Classification(ClassificationMetric),
    Regression(RegressionMetric),
}
