use slab::Slab;

/// Doubly-linked recency list whose nodes live in a `Slab`. A node's slab index is a stable handle that its owner keeps to
/// unlink or promote it in O(1).
#[derive(Clone, Debug)]
pub(crate) struct LruList<T> {
    nodes: Slab<Node<T>>,
    // Most recently used.
    head: Option<usize>,
    // Least recently used.
    tail: Option<usize>,
}

#[derive(Clone, Debug)]
struct Node<T> {
    value: T,
    prev: Option<usize>,
    next: Option<usize>,
}

impl<T> Default for LruList<T> {
    fn default() -> Self {
        Self {
            nodes: Slab::new(),
            head: None,
            tail: None,
        }
    }
}

impl<T> LruList<T> {
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn unlink(&mut self, index: usize) {
        let (prev, next) = {
            let node = &self.nodes[index];
            (node.prev, node.next)
        };
        match prev {
            Some(p) => self.nodes[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => self.tail = prev,
        }
        let node = &mut self.nodes[index];
        node.prev = None;
        node.next = None;
    }

    fn link_front(&mut self, index: usize) {
        let old_head = self.head;
        {
            let node = &mut self.nodes[index];
            node.prev = None;
            node.next = old_head;
        }
        match old_head {
            Some(h) => self.nodes[h].prev = Some(index),
            None => self.tail = Some(index),
        }
        self.head = Some(index);
    }

    fn link_back(&mut self, index: usize) {
        let old_tail = self.tail;
        {
            let node = &mut self.nodes[index];
            node.prev = old_tail;
            node.next = None;
        }
        match old_tail {
            Some(t) => self.nodes[t].next = Some(index),
            None => self.head = Some(index),
        }
        self.tail = Some(index);
    }

    /// Inserts `value` as the most recently used.
    pub fn push_front(&mut self, value: T) -> usize {
        let index = self.nodes.insert(Node {
            value,
            prev: None,
            next: None,
        });
        self.link_front(index);

        index
    }

    /// Inserts `value` as the least recently used, i.e. the next to go.
    pub fn push_back(&mut self, value: T) -> usize {
        let index = self.nodes.insert(Node {
            value,
            prev: None,
            next: None,
        });
        self.link_back(index);

        index
    }

    pub fn move_to_front(&mut self, index: usize) {
        if self.head == Some(index) {
            return;
        }
        self.unlink(index);
        self.link_front(index);
    }

    pub fn remove(&mut self, index: usize) -> T {
        self.unlink(index);

        self.nodes.remove(index).value
    }

    #[cfg(test)]
    pub fn pop_back(&mut self) -> Option<T> {
        let index = self.tail?;

        Some(self.remove(index))
    }

    /// Iterate from the least to the most recently used.
    pub fn iter_from_back(&self) -> impl Iterator<Item = &T> + '_ {
        let mut cursor = self.tail;

        std::iter::from_fn(move || {
            let node = &self.nodes[cursor?];
            cursor = node.prev;

            Some(&node.value)
        })
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod tests {
    use super::*;

    fn order(list: &LruList<char>) -> String {
        list.iter_from_back().collect()
    }

    #[test]
    fn pop_back_returns_least_recent() {
        let mut list = LruList::default();
        list.push_front('a');
        list.push_front('b');
        list.push_front('c');

        assert_eq!(order(&list), "abc");
        assert_eq!(list.pop_back(), Some('a'));
        assert_eq!(list.pop_back(), Some('b'));
        assert_eq!(list.pop_back(), Some('c'));
        assert_eq!(list.pop_back(), None);
        assert!(list.is_empty());
    }

    #[test]
    fn move_to_front_changes_victim() {
        let mut list = LruList::default();
        let a = list.push_front('a');
        list.push_front('b');
        list.push_front('c');

        list.move_to_front(a);
        assert_eq!(order(&list), "bca");
        assert_eq!(list.pop_back(), Some('b'));
    }

    #[test]
    fn push_back_is_next_victim() {
        let mut list = LruList::default();
        list.push_front('a');
        list.push_back('z');

        assert_eq!(list.pop_back(), Some('z'));
    }

    #[test]
    fn remove_from_middle_keeps_links() {
        let mut list = LruList::default();
        list.push_front('a');
        let b = list.push_front('b');
        list.push_front('c');

        assert_eq!(list.remove(b), 'b');
        assert_eq!(order(&list), "ac");
        assert_eq!(list.len(), 2);

        // Freed slots get reused without corrupting the list.
        list.push_front('d');
        assert_eq!(order(&list), "acd");
        assert_eq!(list.len(), 3);
    }
}
