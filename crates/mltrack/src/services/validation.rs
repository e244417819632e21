//! Input checks shared by the stores.
//!
//! Everything here runs before any database row or file is touched, so a
//! rejected request never leaves side effects behind.

use super::types::{
    ExperimentFilters, MetricQuery, NewSample, EXPERIMENT_NAME_MAX_LENGTH, MAX_BATCH_SIZE,
    MAX_EXPERIMENT_PAGE_SIZE, MAX_METRIC_LIMIT, METRIC_NAME_MAX_LENGTH,
};
use super::ServiceError;

/// Validate a single metric sample.
pub fn validate_sample(sample: &NewSample) -> Result<(), ServiceError> {
    if sample.step < 0 {
        return Err(ServiceError::InvalidInput(format!(
            "Step must be non-negative (got {})",
            sample.step
        )));
    }

    let name = sample.metric_name.as_str();
    if name.trim().is_empty() {
        return Err(ServiceError::InvalidInput(
            "Metric name must not be empty".to_string(),
        ));
    }
    if name.chars().count() > METRIC_NAME_MAX_LENGTH {
        return Err(ServiceError::InvalidInput(format!(
            "Metric name exceeds {} characters",
            METRIC_NAME_MAX_LENGTH
        )));
    }

    if !sample.value.is_finite() {
        return Err(ServiceError::InvalidInput(format!(
            "Value for '{}' must not be NaN or infinity",
            name
        )));
    }

    Ok(())
}

/// Validate a batch of samples: size bounds plus every element.
pub fn validate_batch(samples: &[NewSample]) -> Result<(), ServiceError> {
    if samples.is_empty() {
        return Err(ServiceError::InvalidInput(
            "Metric batch must contain at least one sample".to_string(),
        ));
    }
    if samples.len() > MAX_BATCH_SIZE {
        return Err(ServiceError::InvalidInput(format!(
            "Metric batch exceeds {} samples (got {})",
            MAX_BATCH_SIZE,
            samples.len()
        )));
    }

    samples.iter().try_for_each(validate_sample)
}

/// Validate metric query paging.
pub fn validate_metric_query(query: &MetricQuery) -> Result<(), ServiceError> {
    if query.limit == 0 || query.limit > MAX_METRIC_LIMIT {
        return Err(ServiceError::InvalidInput(format!(
            "Limit must be between 1 and {} (got {})",
            MAX_METRIC_LIMIT, query.limit
        )));
    }
    Ok(())
}

/// Validate experiment listing paging.
pub fn validate_experiment_filters(filters: &ExperimentFilters) -> Result<(), ServiceError> {
    if filters.page == 0 {
        return Err(ServiceError::InvalidInput(
            "Page must be at least 1".to_string(),
        ));
    }
    if filters.size == 0 || filters.size > MAX_EXPERIMENT_PAGE_SIZE {
        return Err(ServiceError::InvalidInput(format!(
            "Page size must be between 1 and {} (got {})",
            MAX_EXPERIMENT_PAGE_SIZE, filters.size
        )));
    }
    if filters.offset().is_none() {
        return Err(ServiceError::InvalidInput(format!(
            "Page {} is out of range",
            filters.page
        )));
    }
    Ok(())
}

/// Validate an experiment name.
pub fn validate_experiment_name(name: &str) -> Result<(), ServiceError> {
    if name.trim().is_empty() {
        return Err(ServiceError::InvalidInput(
            "Experiment name must not be empty".to_string(),
        ));
    }
    if name.chars().count() > EXPERIMENT_NAME_MAX_LENGTH {
        return Err(ServiceError::InvalidInput(format!(
            "Experiment name exceeds {} characters",
            EXPERIMENT_NAME_MAX_LENGTH
        )));
    }
    Ok(())
}

/// Turn an untrusted upload filename into one that is safe to join onto an
/// experiment directory.
///
/// Only the final path segment is kept (either separator style). Letters
/// and digits from any script are kept along with `_`, `.` and `-`; every
/// other character becomes `_`. Leading/trailing dots and spaces are
/// trimmed and an empty result is rejected.
pub fn sanitize_filename(filename: &str) -> Result<String, ServiceError> {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or_default();

    let replaced: String = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = replaced.trim_matches(|c| c == '.' || c == ' ');
    if trimmed.is_empty() {
        return Err(ServiceError::InvalidInput("Invalid filename".to_string()));
    }

    Ok(trimmed.to_string())
}
