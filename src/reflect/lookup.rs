use super::{Graph, NodeId};

impl Graph {
    /// Resolve a (possibly dotted) name as seen from `scope`.
    ///
    /// A leading dot anchors the lookup at the root. Otherwise the full path is
    /// tried below `scope`, then below each enclosing namespace up to the root,
    /// so the innermost match wins. With `namespaces_only` the result must be a
    /// namespace-like node (message, enum, service or package), which is what
    /// type references want.
    pub fn resolve(&self, scope: NodeId, name: &str, namespaces_only: bool) -> Option<NodeId> {
        let (absolute, path) = match name.strip_prefix('.') {
            Some(rest) => (true, rest),
            None => (false, name),
        };
        let parts: Vec<&str> = path.split('.').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return None;
        }

        if absolute {
            return self.walk(self.root(), &parts, namespaces_only);
        }

        let mut current = Some(scope);
        while let Some(ns) = current {
            if let Some(found) = self.walk(ns, &parts, namespaces_only) {
                return Some(found);
            }
            current = self.node(ns).parent;
        }
        None
    }

    fn walk(&self, start: NodeId, parts: &[&str], namespaces_only: bool) -> Option<NodeId> {
        let mut ptr = start;
        for part in parts {
            ptr = self.child(ptr, part)?;
        }
        if namespaces_only && !self.node(ptr).kind.is_namespace() {
            return None;
        }
        Some(ptr)
    }

    /// Look up a path from the root. The leading dot is optional.
    pub fn lookup(&self, path: &str) -> Option<NodeId> {
        if path.is_empty() || path == "." {
            return Some(self.root());
        }
        self.resolve(self.root(), path, false)
    }

    /// Shortest name that resolves to `target` when looked up from `scope`,
    /// falling back to the fully qualified name.
    pub fn qn(&self, scope: NodeId, target: NodeId) -> String {
        let mut parts = Vec::new();
        let mut current = Some(target);
        while let Some(cur) = current {
            let node = self.node(cur);
            if node.parent.is_none() {
                break;
            }
            parts.push(node.name.as_str());
            current = node.parent;
        }
        parts.reverse();

        let namespaces_only = self.node(target).kind.is_namespace();
        for start in (0..parts.len()).rev() {
            let candidate = parts[start..].join(".");
            if self.resolve(scope, &candidate, namespaces_only) == Some(target) {
                return candidate;
            }
        }
        self.fqn(target)
    }
}
