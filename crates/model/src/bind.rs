use crate::error::Location;

/// An `xforms:bind` element.
///
/// Nested binds are evaluated once for each node selected by their parent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bind {
    pub id: Option<String>,
    pub nodeset: String,
    pub calculate: Option<String>,
    pub relevant: Option<String>,
    pub readonly: Option<String>,
    pub required: Option<String>,
    pub constraint: Option<String>,
    pub type_name: Option<String>,
    /// `xxforms:default`, applied when initial values are requested.
    pub default_value: Option<String>,
    /// Custom properties, name to expression.
    pub custom: Vec<(String, String)>,
    pub location: Location,
    pub children: Vec<Bind>,
}

impl Bind {
    pub fn new(nodeset: &str) -> Self {
        Self {
            nodeset: nodeset.to_owned(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_owned());
        self
    }

    #[must_use]
    pub fn calculate(mut self, expression: &str) -> Self {
        self.calculate = Some(expression.to_owned());
        self
    }

    #[must_use]
    pub fn relevant(mut self, expression: &str) -> Self {
        self.relevant = Some(expression.to_owned());
        self
    }

    #[must_use]
    pub fn readonly(mut self, expression: &str) -> Self {
        self.readonly = Some(expression.to_owned());
        self
    }

    #[must_use]
    pub fn required(mut self, expression: &str) -> Self {
        self.required = Some(expression.to_owned());
        self
    }

    #[must_use]
    pub fn constraint(mut self, expression: &str) -> Self {
        self.constraint = Some(expression.to_owned());
        self
    }

    #[must_use]
    pub fn with_type(mut self, qname: &str) -> Self {
        self.type_name = Some(qname.to_owned());
        self
    }

    #[must_use]
    pub fn default_value(mut self, expression: &str) -> Self {
        self.default_value = Some(expression.to_owned());
        self
    }

    #[must_use]
    pub fn custom(mut self, name: &str, expression: &str) -> Self {
        self.custom.push((name.to_owned(), expression.to_owned()));
        self
    }

    #[must_use]
    pub fn at(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    #[must_use]
    pub fn child(mut self, child: Self) -> Self {
        self.children.push(child);
        self
    }

    /// Id used in messages: the bind id or its node-set expression.
    pub fn label(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.nodeset)
    }

    /// Whether the bind contributes to recalculation.
    pub fn has_computed_properties(&self) -> bool {
        self.calculate.is_some()
            || self.relevant.is_some()
            || self.readonly.is_some()
            || self.required.is_some()
            || !self.custom.is_empty()
            || self.default_value.is_some()
    }

    /// Whether the bind contributes to revalidation.
    pub fn has_validation_properties(&self) -> bool {
        self.constraint.is_some() || self.type_name.is_some()
    }

    /// Find a bind by id in this bind and its descendants, together with
    /// the chain of ancestors leading to it, outermost first.
    pub fn find_path<'bind>(&'bind self, id: &str, path: &mut Vec<&'bind Self>) -> bool {
        path.push(self);
        if self.id.as_deref() == Some(id) {
            return true;
        }
        for child in &self.children {
            if child.find_path(id, path) {
                return true;
            }
        }
        path.pop();
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// # Panics
    /// Panics if nested binds cannot be located.
    #[test]
    fn finds_nested_bind_with_ancestors() {
        let root = Bind::new("order")
            .with_id("order")
            .child(Bind::new("line").child(Bind::new("@qty").with_id("qty")));
        let mut path = Vec::new();
        assert!(root.find_path("qty", &mut path));
        let nodesets: Vec<&str> = path.iter().map(|bind| bind.nodeset.as_str()).collect();
        assert_eq!(nodesets, vec!["order", "line", "@qty"]);

        let mut missing = Vec::new();
        assert!(!root.find_path("nope", &mut missing));
        assert!(missing.is_empty());
    }
}
