use crate::template::{Node, Template};

/// ## Read-only access
impl Template {
    /// Get parent node.
    ///
    /// Returns [`None`] for the root and for detached nodes.
    pub fn parent(&self, node: Node) -> Option<Node> {
        self.arena[node.get()].parent().map(Node::new)
    }

    /// Iterator over the child nodes of this node.
    ///
    /// ```rust
    /// use tagrules::{parse_template, ParseOptions};
    ///
    /// let template = parse_template("<a/><b/>", &ParseOptions::default())?;
    /// let children = template.children(template.root()).collect::<Vec<_>>();
    /// assert_eq!(children.len(), 2);
    /// # Ok::<(), tagrules::Error>(())
    /// ```
    pub fn children(&self, node: Node) -> impl Iterator<Item = Node> + '_ {
        node.get().children(&self.arena).map(Node::new)
    }

    /// Get first child.
    pub fn first_child(&self, node: Node) -> Option<Node> {
        self.arena[node.get()].first_child().map(Node::new)
    }

    /// Get last child.
    pub fn last_child(&self, node: Node) -> Option<Node> {
        self.arena[node.get()].last_child().map(Node::new)
    }

    /// Get next sibling.
    pub fn next_sibling(&self, node: Node) -> Option<Node> {
        self.arena[node.get()].next_sibling().map(Node::new)
    }

    /// Get previous sibling.
    pub fn previous_sibling(&self, node: Node) -> Option<Node> {
        self.arena[node.get()].previous_sibling().map(Node::new)
    }

    /// Iterator over the ancestors of this node, nearest first. The node
    /// itself is not included.
    pub fn ancestors(&self, node: Node) -> impl Iterator<Item = Node> + '_ {
        node.get().ancestors(&self.arena).skip(1).map(Node::new)
    }

    /// Iterator over the descendants of this node, including this one. In
    /// document order (pre-order depth-first).
    ///
    /// ```rust
    /// use tagrules::{parse_template, ParseOptions};
    ///
    /// let template = parse_template("<a><b/></a><c/>", &ParseOptions::default())?;
    /// let names = template
    ///     .descendants(template.root())
    ///     .filter_map(|node| template.html_name(node))
    ///     .collect::<Vec<_>>();
    /// assert_eq!(names, vec!["a", "b", "c"]);
    /// # Ok::<(), tagrules::Error>(())
    /// ```
    pub fn descendants(&self, node: Node) -> impl Iterator<Item = Node> + '_ {
        node.get().descendants(&self.arena).map(Node::new)
    }

    /// Whether the node was removed from the template.
    pub fn is_removed(&self, node: Node) -> bool {
        self.arena[node.get()].is_removed()
    }
}

/// ## Manipulation
impl Template {
    /// Append a child to a parent, detaching it from its previous position.
    ///
    /// Panics if `child` is `parent` or one of its ancestors.
    pub fn append(&mut self, parent: Node, child: Node) {
        child.get().detach(&mut self.arena);
        parent.get().append(child.get(), &mut self.arena);
    }

    /// Insert a node before a sibling, detaching it from its previous
    /// position.
    ///
    /// Panics if `new_sibling` is `reference_node` or one of its ancestors.
    pub fn insert_before(&mut self, reference_node: Node, new_sibling: Node) {
        new_sibling.get().detach(&mut self.arena);
        reference_node
            .get()
            .insert_before(new_sibling.get(), &mut self.arena);
    }

    /// Remove a node and its descendants.
    pub fn remove(&mut self, node: Node) {
        let removed = self.descendants(node).collect::<Vec<_>>();
        for node in removed {
            self.unescaped.remove(&node);
        }
        node.get().remove_subtree(&mut self.arena);
    }
}
