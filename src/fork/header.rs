//! Forks matching the method and plain header values.

use crate::{
    fork::chain::{Fork, Routed},
    http::{request::Request, types::Method},
    take::signal::Take,
};

/// Matches a set of HTTP methods.
pub struct FkMethods {
    methods: Vec<Method>,
    take: Box<dyn Take>,
}

impl FkMethods {
    pub fn new(methods: impl IntoIterator<Item = Method>, take: impl Take + 'static) -> Self {
        Self {
            methods: methods.into_iter().collect(),
            take: Box::new(take),
        }
    }
}

impl Fork for FkMethods {
    fn route(&self, req: Request) -> Routed<'_> {
        match self.methods.contains(&req.method()) {
            true => Routed::To(self.take.as_ref(), req),
            false => Routed::Skip(req),
        }
    }
}

/// Matches when a header is present, optionally with a given value
/// (compared case-insensitively, surrounding spaces ignored).
pub struct FkHeader {
    name: String,
    value: Option<String>,
    take: Box<dyn Take>,
}

impl FkHeader {
    /// Any value of `name` matches.
    pub fn new(name: impl Into<String>, take: impl Take + 'static) -> Self {
        Self {
            name: name.into(),
            value: None,
            take: Box::new(take),
        }
    }

    /// One of the lines of `name` must equal `value`.
    pub fn with_value(
        name: impl Into<String>,
        value: impl Into<String>,
        take: impl Take + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
            take: Box::new(take),
        }
    }
}

impl Fork for FkHeader {
    fn route(&self, req: Request) -> Routed<'_> {
        let matched = match &self.value {
            None => req.headers().contains(&self.name),
            Some(expected) => req
                .header_all(&self.name)
                .any(|value| value.trim().eq_ignore_ascii_case(expected)),
        };

        match matched {
            true => Routed::To(self.take.as_ref(), req),
            false => Routed::Skip(req),
        }
    }
}

/// Matches the `Host` header, case-insensitively and ignoring the port.
pub struct FkHost {
    host: String,
    take: Box<dyn Take>,
}

impl FkHost {
    pub fn new(host: impl Into<String>, take: impl Take + 'static) -> Self {
        Self {
            host: host.into(),
            take: Box::new(take),
        }
    }
}

impl Fork for FkHost {
    fn route(&self, req: Request) -> Routed<'_> {
        let matched = req
            .header("Host")
            .map(|host| strip_port(host.trim()))
            .is_some_and(|host| host.eq_ignore_ascii_case(&self.host));

        match matched {
            true => Routed::To(self.take.as_ref(), req),
            false => Routed::Skip(req),
        }
    }
}

// "example.com:8080" -> "example.com", "[::1]:80" -> "[::1]"
fn strip_port(host: &str) -> &str {
    match host.rsplit_once(':') {
        Some((name, port)) if !name.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => {
            match name.starts_with('[') || !name.contains(':') {
                true => name,
                false => host,
            }
        }
        _ => host,
    }
}
