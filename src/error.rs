use std::fmt::Display;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum VpcApiError {
    #[error("{0}")]
    Validation(String),
    #[error("VPC {0} not found")]
    NotFound(String),
    #[error("{operation} failed: {message}")]
    Aws {
        operation: &'static str,
        message: String,
    },
    #[error("{operation} response is missing {field}")]
    NoneValue {
        operation: &'static str,
        field: &'static str,
    },
    #[error("malformed VPC record: {0}")]
    MalformedRecord(String),
    #[error("missing environment variable {0}")]
    MissingEnv(&'static str),
}

impl VpcApiError {
    pub fn aws<E: Display>(operation: &'static str, error: E) -> Self {
        VpcApiError::Aws {
            operation,
            message: error.to_string(),
        }
    }

    pub fn none_value(operation: &'static str, field: &'static str) -> Self {
        VpcApiError::NoneValue { operation, field }
    }
}

#[cfg(test)]
mod tests {
    use crate::error::VpcApiError;

    #[test]
    fn test_aws_error_display() {
        let error = VpcApiError::aws("CreateVpc", "VpcLimitExceeded");
        assert_eq!(error.to_string(), "CreateVpc failed: VpcLimitExceeded");
    }

    #[test]
    fn test_none_value_display() {
        let error = VpcApiError::none_value("CreateSubnet", "SubnetId");
        assert_eq!(error.to_string(), "CreateSubnet response is missing SubnetId");
    }
}
