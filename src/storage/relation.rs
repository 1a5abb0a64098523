use crate::core::{EngineError, PackedTuple, Result, Schema};

use super::{Page, PageId};

/// An ordered sequence of pages identified by a string relation-id and
/// tagged with a schema.
#[derive(Clone, Debug)]
pub struct Relation {
    pub id: String,
    pub schema: Schema,
    pages: Vec<Page>,
}

impl Relation {
    pub fn new(id: impl Into<String>, schema: Schema) -> Self {
        Self {
            id: id.into(),
            schema,
            pages: Vec::new(),
        }
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    /// Appends a tuple, starting a new page when the current last page is
    /// full (or there is none yet).
    pub fn insert_tuple(&mut self, tuple: PackedTuple) {
        if self.pages.last().map(|p| p.is_full()).unwrap_or(true) {
            let index = self.pages.len();
            self.pages.push(Page::new(PageId::new(self.id.clone(), index)));
        }
        let last = self.pages.last_mut().expect("page just pushed");
        let inserted = last.insert(tuple);
        debug_assert!(inserted, "freshly started page cannot be full");
    }
}

/// A restartable cursor over a relation's pages, scanning one page at a
/// time. `reopen()` resets the scan to the first page without re-reading
/// storage, matching the contract tuple-nested-loop and hash/group-by
/// partitioning both require of the right/child relation.
#[derive(Clone, Debug)]
pub struct RelationCursor {
    relation_id: String,
    index: usize,
}

impl RelationCursor {
    pub fn new(relation_id: impl Into<String>) -> Self {
        Self {
            relation_id: relation_id.into(),
            index: 0,
        }
    }

    pub fn relation_id(&self) -> &str {
        &self.relation_id
    }

    pub fn reopen(&mut self) {
        self.index = 0;
    }

    pub fn next(&mut self, relation: &Relation) -> Result<Option<(PageId, Page)>> {
        if relation.id != self.relation_id {
            return Err(EngineError::storage(format!(
                "cursor over '{}' fed relation '{}'",
                self.relation_id, relation.id
            )));
        }
        if self.index >= relation.pages.len() {
            return Ok(None);
        }
        let page = relation.pages[self.index].clone();
        self.index += 1;
        Ok(Some((page.id.clone(), page)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Field, Schema, Type};

    fn int_schema() -> Schema {
        Schema::new(vec![Field::new("id", Type::Int)])
    }

    #[test]
    fn insert_tuple_starts_a_new_page_on_overflow() {
        let mut relation = Relation::new("r", int_schema());
        for i in 0..(Page::CAPACITY * 2 + 1) {
            relation.insert_tuple(vec![i as u8]);
        }
        assert_eq!(relation.pages().len(), 3);
        assert_eq!(relation.pages()[0].len(), Page::CAPACITY);
        assert_eq!(relation.pages()[1].len(), Page::CAPACITY);
        assert_eq!(relation.pages()[2].len(), 1);
    }

    #[test]
    fn cursor_scans_every_page_once_then_stops() {
        let mut relation = Relation::new("r", int_schema());
        for i in 0..(Page::CAPACITY + 1) {
            relation.insert_tuple(vec![i as u8]);
        }
        let mut cursor = RelationCursor::new("r");
        assert!(cursor.next(&relation).unwrap().is_some());
        assert!(cursor.next(&relation).unwrap().is_some());
        assert!(cursor.next(&relation).unwrap().is_none());

        cursor.reopen();
        assert!(cursor.next(&relation).unwrap().is_some());
    }

    #[test]
    fn cursor_rejects_a_relation_it_was_not_built_for() {
        let relation = Relation::new("other", int_schema());
        let mut cursor = RelationCursor::new("r");
        assert!(cursor.next(&relation).is_err());
    }
}
