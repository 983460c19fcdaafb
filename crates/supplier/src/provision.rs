//! Mount-point provisioning.
//!
//! A supplier mounted at `/mongo` that provisions `database` and `collection`
//! turns `/bob/apples/select` into `/select`, attaching
//! `{"database":"bob","collection":"apples"}` as the resource descriptor and
//! appending `/bob/apples` to the routing trail.

use crate::errors::SupplierError;
use crate::request::{Resource, SupplierAlias, SupplierRequest};

/// Outcome of provisioning one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provisioned {
    /// URL before provisioning.
    pub original_url: String,
    /// Routing trail after provisioning.
    pub route: Option<String>,
    /// Resource descriptor attached to the request.
    pub resource: Resource,
}

/// Strips a fixed list of leading URL segments into a resource descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Provisioner {
    names: Vec<String>,
}

impl Provisioner {
    /// Creates a provisioner consuming one segment per name, in order.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Replaces the configured names; an empty list leaves them unchanged.
    pub fn configure<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if !names.is_empty() {
            self.names = names;
        }
    }

    /// Configured segment names.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Provisions `request` in place.
    ///
    /// The resource descriptor header is always attached, empty when no names
    /// are configured.
    ///
    /// # Errors
    ///
    /// Returns `SupplierError::MalformedHeader` if the incoming trail header is
    /// not a string, or `SupplierError::InsufficientPathSegments` if the URL
    /// has fewer segments than configured names. Either way the request is
    /// left untouched.
    pub fn provision(&self, request: &mut SupplierRequest) -> Result<Provisioned, SupplierError> {
        let trail = request.trail()?.map(str::to_owned);
        let original_url = request.url.clone();
        let mut resource = Resource::new();

        if !self.names.is_empty() {
            let path = request.url.strip_prefix('/').unwrap_or(&request.url);
            let segments: Vec<&str> = path.split('/').collect();
            if segments.len() < self.names.len() {
                return Err(SupplierError::insufficient_segments(
                    self.names.len(),
                    segments.len(),
                ));
            }

            let (consumed, remaining) = segments.split_at(self.names.len());
            for (name, segment) in self.names.iter().zip(consumed) {
                resource.insert(name.clone(), (*segment).to_owned());
            }

            let extra = consumed.join("/");
            let route = match trail {
                Some(trail) => format!("{trail}/{extra}"),
                None => format!("/{extra}"),
            };
            request.url = format!("/{}", remaining.join("/"));
            request.set_route(route);
        }

        request.set_resource(&resource);
        Ok(Provisioned {
            original_url,
            route: request.route().map(str::to_owned),
            resource,
        })
    }
}

/// Applies the request's alias directive, falling back to `configured`.
///
/// # Errors
///
/// Returns `SupplierError::MalformedHeader` if the alias or trail header is
/// malformed.
pub fn apply_alias(
    request: &mut SupplierRequest,
    configured: Option<&SupplierAlias>,
) -> Result<(), SupplierError> {
    let from_header = request.alias()?;
    let Some(alias) = from_header.as_ref().or(configured) else {
        return Ok(());
    };
    if let Some(rewritten) = request.trail()?.and_then(|route| alias.apply(route)) {
        request.set_route(rewritten);
    }
    Ok(())
}
