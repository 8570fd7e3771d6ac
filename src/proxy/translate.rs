use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Path family exposed by a target deployment.
///
/// The registry serves logically equivalent operations under two path
/// schemes: the standard credential-bearing API family and the direct
/// UI-facing family. Routes always accept standard-family paths externally;
/// the translator bridges to whichever family the target is configured with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathFamily {
    #[default]
    Standard,
    Direct,
}

/// A supported logical operation and its path in each family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operation {
    /// Stable operation name
    pub name: &'static str,

    /// Path in the standard API family
    pub standard: &'static str,

    /// Path in the direct (UI-facing) family
    pub direct: &'static str,

    /// Whether the operation mutates registry state (drives webhook egress)
    pub write_class: bool,
}

impl Operation {
    pub fn path(&self, family: PathFamily) -> &'static str {
        match family {
            PathFamily::Standard => self.standard,
            PathFamily::Direct => self.direct,
        }
    }
}

/// Explicit, total mapping over the supported operation set. Paths outside
/// this table are rejected, never passed through.
const OPERATIONS: &[Operation] = &[
    Operation {
        name: "registry.version",
        standard: "/api/2.0/mlflow/version",
        direct: "/ajax-api/2.0/mlflow/version",
        write_class: false,
    },
    Operation {
        name: "registered_models.create",
        standard: "/api/2.0/mlflow/registered-models/create",
        direct: "/ajax-api/2.0/mlflow/registered-models/create",
        write_class: true,
    },
    Operation {
        name: "registered_models.get",
        standard: "/api/2.0/mlflow/registered-models/get",
        direct: "/ajax-api/2.0/mlflow/registered-models/get",
        write_class: false,
    },
    Operation {
        name: "registered_models.search",
        standard: "/api/2.0/mlflow/registered-models/search",
        direct: "/ajax-api/2.0/mlflow/registered-models/search",
        write_class: false,
    },
    Operation {
        name: "registered_models.update",
        standard: "/api/2.0/mlflow/registered-models/update",
        direct: "/ajax-api/2.0/mlflow/registered-models/update",
        write_class: true,
    },
    Operation {
        name: "registered_models.delete",
        standard: "/api/2.0/mlflow/registered-models/delete",
        direct: "/ajax-api/2.0/mlflow/registered-models/delete",
        write_class: true,
    },
    Operation {
        name: "model_versions.create",
        standard: "/api/2.0/mlflow/model-versions/create",
        direct: "/ajax-api/2.0/mlflow/model-versions/create",
        write_class: true,
    },
    Operation {
        name: "model_versions.get",
        standard: "/api/2.0/mlflow/model-versions/get",
        direct: "/ajax-api/2.0/mlflow/model-versions/get",
        write_class: false,
    },
    Operation {
        name: "model_versions.search",
        standard: "/api/2.0/mlflow/model-versions/search",
        direct: "/ajax-api/2.0/mlflow/model-versions/search",
        write_class: false,
    },
    Operation {
        name: "model_versions.update",
        standard: "/api/2.0/mlflow/model-versions/update",
        direct: "/ajax-api/2.0/mlflow/model-versions/update",
        write_class: true,
    },
    Operation {
        name: "model_versions.transition_stage",
        standard: "/api/2.0/mlflow/model-versions/transition-stage",
        direct: "/ajax-api/2.0/mlflow/model-versions/transition-stage",
        write_class: true,
    },
    Operation {
        name: "model_versions.get_download_uri",
        standard: "/api/2.0/mlflow/model-versions/get-download-uri",
        direct: "/ajax-api/2.0/mlflow/model-versions/get-download-uri",
        write_class: false,
    },
    // Authority-host operations; identical in both families.
    Operation {
        name: "keys.validate",
        standard: "/api/v1/keys/validate",
        direct: "/api/v1/keys/validate",
        write_class: false,
    },
    Operation {
        name: "keys.create",
        standard: "/api/v1/keys",
        direct: "/api/v1/keys",
        write_class: true,
    },
    Operation {
        name: "health",
        standard: "/health",
        direct: "/health",
        write_class: false,
    },
];

/// Translate an externally visible path into the target's path family.
///
/// Accepts paths from either family so that a direct-family deployment can
/// also sit behind standard-family routes. Pure function; unknown paths fail
/// with `UnmappablePath`.
pub fn translate(
    external_path: &str,
    family: PathFamily,
) -> Result<(&'static Operation, &'static str), GatewayError> {
    let operation = OPERATIONS
        .iter()
        .find(|op| op.standard == external_path || op.direct == external_path)
        .ok_or_else(|| GatewayError::UnmappablePath(external_path.to_string()))?;

    Ok((operation, operation.path(family)))
}

/// Look up an operation by its stable name
pub fn operation(name: &str) -> Option<&'static Operation> {
    OPERATIONS.iter().find(|op| op.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_to_direct() {
        let (op, path) =
            translate("/api/2.0/mlflow/registered-models/get", PathFamily::Direct).unwrap();

        assert_eq!(op.name, "registered_models.get");
        assert_eq!(path, "/ajax-api/2.0/mlflow/registered-models/get");
        assert!(!op.write_class);
    }

    #[test]
    fn test_direct_to_standard() {
        let (op, path) =
            translate("/ajax-api/2.0/mlflow/model-versions/create", PathFamily::Standard).unwrap();

        assert_eq!(op.name, "model_versions.create");
        assert_eq!(path, "/api/2.0/mlflow/model-versions/create");
        assert!(op.write_class);
    }

    #[test]
    fn test_same_family_is_identity() {
        let (_, path) =
            translate("/api/2.0/mlflow/version", PathFamily::Standard).unwrap();
        assert_eq!(path, "/api/2.0/mlflow/version");
    }

    #[test]
    fn test_translation_is_idempotent() {
        for family in [PathFamily::Standard, PathFamily::Direct] {
            let (_, once) = translate("/api/2.0/mlflow/model-versions/search", family).unwrap();
            let (_, twice) = translate(once, family).unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_unmapped_path_is_rejected_not_passed_through() {
        let err = translate("/api/2.0/mlflow/unknown-op", PathFamily::Standard).unwrap_err();
        assert!(matches!(err, GatewayError::UnmappablePath(_)));

        let err = translate("/api/2.0/preview/mlflow/version", PathFamily::Direct).unwrap_err();
        assert_eq!(err.kind(), "unmappable_path");
    }

    #[test]
    fn test_authority_paths_are_family_invariant() {
        let (op, path) = translate("/api/v1/keys/validate", PathFamily::Direct).unwrap();
        assert_eq!(path, "/api/v1/keys/validate");
        assert_eq!(op.name, "keys.validate");
    }

    #[test]
    fn test_write_class_flags() {
        assert!(operation("registered_models.create").unwrap().write_class);
        assert!(operation("model_versions.transition_stage").unwrap().write_class);
        assert!(!operation("registry.version").unwrap().write_class);
        assert!(!operation("registered_models.search").unwrap().write_class);
    }
}
