/// Settings that shape how a [`Builder`](crate::Builder) creates fields and
/// how runtime messages are initialized.
///
/// The options are copied into the type graph, so every runtime type built
/// from a builder sees the values that were in effect when it was created.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BuilderOptions {
    /// Rename `foo_bar` fields to `fooBar` when they are created.
    pub convert_fields_to_camel_case: bool,
    /// Fill in defaults for absent required and proto3 implicit-presence fields
    /// when a message is constructed or decoded.
    pub populate_defaults: bool,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        BuilderOptions {
            convert_fields_to_camel_case: false,
            populate_defaults: true,
        }
    }
}

impl BuilderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn camel_case(mut self, enabled: bool) -> Self {
        self.convert_fields_to_camel_case = enabled;
        self
    }

    pub fn populate_defaults(mut self, enabled: bool) -> Self {
        self.populate_defaults = enabled;
        self
    }
}

/// `foo_bar_baz` -> `fooBarBaz`.
pub(crate) fn to_camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.chars() {
        if c == '_' && !out.is_empty() {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}
