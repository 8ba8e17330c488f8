//! Case-insensitive list filters applied to catalog results.

use crate::api::ServiceInstance;
use crate::catalog::Instance;

fn same(a: &str, b: &str) -> bool {
    a.to_uppercase() == b.to_uppercase()
}

pub fn instances_by_name(instances: Vec<Instance>, name: &str) -> Vec<Instance> {
    instances.into_iter().filter(|i| same(&i.name, name)).collect()
}

pub fn instances_by_class_id(instances: Vec<Instance>, class_id: &str) -> Vec<Instance> {
    instances
        .into_iter()
        .filter(|i| same(&i.class_id, class_id))
        .collect()
}

pub fn service_instances_by_offering_name(
    instances: Vec<ServiceInstance>,
    offering_name: &str,
) -> Vec<ServiceInstance> {
    instances
        .into_iter()
        .filter(|i| same(&i.service_name, offering_name))
        .collect()
}

pub fn service_instances_by_plan_name(
    instances: Vec<ServiceInstance>,
    plan_name: &str,
) -> Vec<ServiceInstance> {
    instances
        .into_iter()
        .filter(|i| same(&i.service_plan_name, plan_name))
        .collect()
}

/// Optional `GET /services` filters; empty strings are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceFilters {
    pub offering_id: String,
    pub name: String,
    pub offering_name: String,
    pub plan_name: String,
}

impl ServiceFilters {
    /// Query parameters for the non-empty filters.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        [
            ("offeringId", &self.offering_id),
            ("name", &self.name),
            ("offeringName", &self.offering_name),
            ("planName", &self.plan_name),
        ]
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| (key, value.clone()))
        .collect()
    }
}

/// Paging and ordering forwarded to catalog list calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemFilter {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub sort: Option<String>,
}

impl ItemFilter {
    pub fn is_empty(&self) -> bool {
        self.limit.is_none() && self.offset.is_none() && self.sort.is_none()
    }

    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(limit) = self.limit {
            pairs.push(("limit", limit.to_string()));
        }
        if let Some(offset) = self.offset {
            pairs.push(("offset", offset.to_string()));
        }
        if let Some(ref sort) = self.sort {
            pairs.push(("sort", sort.clone()));
        }
        pairs
    }
}
