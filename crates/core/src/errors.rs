use thiserror::Error;

use crate::domain::analytic::AnalyticStatus;
use crate::domain::job::{JobId, JobStatus};
use crate::domain::product::ProductId;
use crate::domain::slot::WarehouseId;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum DomainError {
    #[error("invalid analytic transition from {from:?} to {to:?}")]
    InvalidAnalyticTransition { from: AnalyticStatus, to: AnalyticStatus },
    #[error("job {job_id} cannot be executed from state {from:?}")]
    InvalidJobState { job_id: JobId, from: JobStatus },
    #[error("product {product_id} has no slot assignment in warehouse {warehouse_id}")]
    NoCurrentLocation { product_id: ProductId, warehouse_id: WarehouseId },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("order history source unavailable: {0}")]
    DataUnavailable(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("warehouse {warehouse_id} already has a running optimization job")]
    WarehouseBusy { warehouse_id: WarehouseId, running_job_id: Option<JobId> },
    #[error("job {job_id} exceeded its {budget_secs}s wall-clock budget")]
    Timeout { job_id: JobId, budget_secs: u64 },
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Conflict { .. } => {
                "The resource is in a state that does not allow this operation."
            }
            Self::NotFound { .. } => "The requested resource does not exist.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Domain(
                error @ (DomainError::InvalidAnalyticTransition { .. }
                | DomainError::InvalidJobState { .. }),
            ) => Self::Conflict { message: error.to_string(), correlation_id },
            ApplicationError::Domain(error) => {
                Self::BadRequest { message: error.to_string(), correlation_id }
            }
            error @ ApplicationError::WarehouseBusy { .. } => {
                Self::Conflict { message: error.to_string(), correlation_id }
            }
            ApplicationError::NotFound(message) => Self::NotFound { message, correlation_id },
            ApplicationError::DataUnavailable(message)
            | ApplicationError::Persistence(message) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            error @ ApplicationError::Timeout { .. } => {
                Self::ServiceUnavailable { message: error.to_string(), correlation_id }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::analytic::AnalyticStatus;
    use crate::domain::job::{JobId, JobStatus};
    use crate::domain::product::ProductId;
    use crate::domain::slot::WarehouseId;
    use crate::errors::{ApplicationError, DomainError, InterfaceError};

    #[test]
    fn state_transition_errors_map_to_conflict() {
        let interface = ApplicationError::from(DomainError::InvalidAnalyticTransition {
            from: AnalyticStatus::Approved,
            to: AnalyticStatus::Rejected,
        })
        .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::Conflict { ref correlation_id, .. } if correlation_id == "req-1"
        ));
    }

    #[test]
    fn busy_warehouse_maps_to_conflict() {
        let interface = ApplicationError::WarehouseBusy {
            warehouse_id: WarehouseId("wh-main".to_string()),
            running_job_id: Some(JobId("job-1".to_string())),
        }
        .into_interface("req-2");

        assert!(matches!(interface, InterfaceError::Conflict { .. }));
        assert_eq!(
            interface.user_message(),
            "The resource is in a state that does not allow this operation."
        );
    }

    #[test]
    fn missing_baseline_maps_to_bad_request() {
        let interface = ApplicationError::from(DomainError::NoCurrentLocation {
            product_id: ProductId("prod-1".to_string()),
            warehouse_id: WarehouseId("wh-main".to_string()),
        })
        .into_interface("req-3");

        assert!(matches!(interface, InterfaceError::BadRequest { .. }));
    }

    #[test]
    fn data_unavailable_maps_to_service_unavailable() {
        let interface =
            ApplicationError::DataUnavailable("order history query failed".to_string())
                .into_interface("req-4");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(
            interface.user_message(),
            "The service is temporarily unavailable. Please retry shortly."
        );
    }

    #[test]
    fn timeout_maps_to_service_unavailable() {
        let interface = ApplicationError::Timeout {
            job_id: JobId("job-9".to_string()),
            budget_secs: 300,
        }
        .into_interface("req-5");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
    }

    #[test]
    fn invalid_job_state_mentions_the_job() {
        let error = DomainError::InvalidJobState {
            job_id: JobId("job-7".to_string()),
            from: JobStatus::Completed,
        };
        assert!(error.to_string().contains("job-7"));
    }
}
