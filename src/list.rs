/// Handle of a region inside the arena's region slab.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct RegionId(pub usize);

/// Optional handle to the neighbouring node.
pub(crate) type Link = Option<RegionId>;

/// Intrusive links stored inside every node of a [`List`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Links {
    /// Handle to the next node of the list
    pub next: Link,
    /// Handle to the previous node of the list
    pub prev: Link,
}

/// Anything that can be threaded through a [`List`].
pub(crate) trait Linked {
    fn links(&self) -> &Links;
    fn links_mut(&mut self) -> &mut Links;
}

/// Doubly linked list of nodes that live in an external slab.
///
/// The list only stores the head, the tail and its length. The nodes
/// themselves are owned by the slab and keep their [`Links`] inline, so
/// a node can be moved between lists without any allocation. Every
/// operation receives the slab the handles point into.
#[derive(Debug)]
pub(crate) struct List {
    head: Link,
    tail: Link,
    len: usize,
}

pub(crate) struct Iter<'a, T> {
    current: Link,
    nodes: &'a [T],
    remaining: usize,
}

impl List {
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn first(&self) -> Link {
        self.head
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Links `id` as the new head of the list.
    ///
    /// The node must not belong to any list when this is called.
    pub fn push_front<T: Linked>(&mut self, id: RegionId, nodes: &mut [T]) {
        *nodes[id.0].links_mut() = Links {
            next: self.head,
            prev: None,
        };

        match self.head {
            Some(head) => nodes[head.0].links_mut().prev = Some(id),
            None => self.tail = Some(id),
        }

        self.head = Some(id);
        self.len += 1;
    }

    /// Unlinks and returns the head of the list, if any.
    pub fn pop_front<T: Linked>(&mut self, nodes: &mut [T]) -> Option<RegionId> {
        let head = self.head?;
        self.remove(head, nodes);

        Some(head)
    }

    /// Unlinks `id`, which has to be a member of this list, from any position.
    ///
    /// When `id` is the head its successor becomes the new head, and when it
    /// is the tail its predecessor becomes the new tail.
    pub fn remove<T: Linked>(&mut self, id: RegionId, nodes: &mut [T]) {
        let Links { next, prev } = *nodes[id.0].links();

        match prev {
            Some(prev) => nodes[prev.0].links_mut().next = next,
            None => {
                debug_assert_eq!(self.head, Some(id));
                self.head = next;
            }
        }

        match next {
            Some(next) => nodes[next.0].links_mut().prev = prev,
            None => {
                debug_assert_eq!(self.tail, Some(id));
                self.tail = prev;
            }
        }

        *nodes[id.0].links_mut() = Links::default();
        self.len -= 1;
    }

    pub fn iter<'a, T: Linked>(&self, nodes: &'a [T]) -> Iter<'a, T> {
        Iter {
            current: self.head,
            nodes,
            remaining: self.len,
        }
    }
}

impl Default for List {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Linked> Iterator for Iter<'_, T> {
    type Item = RegionId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.current?;

        self.current = self.nodes[id.0].links().next;
        self.remaining -= 1;

        Some(id)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Node {
        links: Links,
    }

    impl Linked for Node {
        fn links(&self) -> &Links {
            &self.links
        }

        fn links_mut(&mut self) -> &mut Links {
            &mut self.links
        }
    }

    fn nodes(count: usize) -> Vec<Node> {
        (0..count).map(|_| Node::default()).collect()
    }

    fn filled(nodes: &mut [Node]) -> List {
        let mut list = List::new();
        for id in 0..nodes.len() {
            list.push_front(RegionId(id), nodes);
        }
        list
    }

    fn collect(list: &List, nodes: &[Node]) -> Vec<usize> {
        list.iter(nodes).map(|id| id.0).collect()
    }

    #[test]
    fn new_list_is_empty() {
        let list = List::new();
        let nodes = nodes(0);

        assert_eq!(list.len(), 0);
        assert!(list.is_empty());
        assert!(list.iter(&nodes).next().is_none());
    }

    #[test]
    fn push_front_prepends() {
        let mut nodes = nodes(3);
        let list = filled(&mut nodes);

        assert_eq!(vec![2, 1, 0], collect(&list, &nodes));
        assert_eq!(Some(RegionId(2)), list.first());
        assert_eq!(Some(RegionId(0)), list.tail);
        assert_eq!(3, list.iter(&nodes).size_hint().0);
    }

    #[test]
    fn pop_front_drains_in_order() {
        let mut nodes = nodes(3);
        let mut list = filled(&mut nodes);

        assert_eq!(Some(RegionId(2)), list.pop_front(&mut nodes));
        assert_eq!(Some(RegionId(1)), list.pop_front(&mut nodes));
        assert_eq!(Some(RegionId(0)), list.pop_front(&mut nodes));
        assert_eq!(None, list.pop_front(&mut nodes));
        assert!(list.is_empty());
        assert_eq!(None, list.tail);
    }

    #[test]
    fn removing_head_promotes_successor() {
        let mut nodes = nodes(3);
        let mut list = filled(&mut nodes);

        list.remove(RegionId(2), &mut nodes);

        assert_eq!(vec![1, 0], collect(&list, &nodes));
        assert_eq!(Some(RegionId(1)), list.first());
        assert_eq!(None, nodes[1].links.prev);
        assert_eq!(Links::default(), nodes[2].links);
    }

    #[test]
    fn removing_interior_relinks_both_neighbours() {
        let mut nodes = nodes(3);
        let mut list = filled(&mut nodes);

        list.remove(RegionId(1), &mut nodes);

        assert_eq!(vec![2, 0], collect(&list, &nodes));
        assert_eq!(Some(RegionId(0)), nodes[2].links.next);
        assert_eq!(Some(RegionId(2)), nodes[0].links.prev);
    }

    #[test]
    fn removing_tail_moves_tail_back() {
        let mut nodes = nodes(3);
        let mut list = filled(&mut nodes);

        list.remove(RegionId(0), &mut nodes);

        assert_eq!(vec![2, 1], collect(&list, &nodes));
        assert_eq!(Some(RegionId(1)), list.tail);
        assert_eq!(None, nodes[1].links.next);
    }

    #[test]
    fn removing_only_node_empties_list() {
        let mut nodes = nodes(1);
        let mut list = filled(&mut nodes);

        list.remove(RegionId(0), &mut nodes);

        assert!(list.is_empty());
        assert_eq!(None, list.first());
        assert_eq!(None, list.tail);
    }
}
