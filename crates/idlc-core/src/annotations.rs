//! User annotations (`@id(...)` and the commented `//@` form).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::Value;

/// A single annotation field value.
///
/// `Symbol` covers bare identifiers used as symbolic values (enum member
/// names and the like); `Nested` covers annotation-valued members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AnnotationValue {
    Literal(Value),
    Symbol(String),
    Nested(Box<Annotation>),
    List(Vec<AnnotationValue>),
}

impl AnnotationValue {
    pub fn as_int(&self) -> Option<i128> {
        match self {
            AnnotationValue::Literal(v) => v.as_int(),
            _ => None,
        }
    }
}

/// An annotation instance: an id plus named fields.
///
/// A single-value body (`@foo(13)`) is stored under the `value` field, the
/// same key an explicit `@foo(value=13)` produces. Marker annotations have
/// an empty field map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: String,
    pub fields: IndexMap<String, AnnotationValue>,
}

impl Annotation {
    pub fn new(id: impl Into<String>) -> Self {
        Annotation { id: id.into(), fields: IndexMap::new() }
    }

    pub fn with_fields(id: impl Into<String>, fields: IndexMap<String, AnnotationValue>) -> Self {
        Annotation { id: id.into(), fields }
    }

    pub fn field(&self, name: &str) -> Option<&AnnotationValue> {
        self.fields.get(name)
    }

    /// The single positional value, if the annotation carries one.
    pub fn value(&self) -> Option<&AnnotationValue> {
        self.fields.get("value")
    }
}

/// Ordered collection of annotations attached to a definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Annotations(Vec<Annotation>);

impl Annotations {
    pub fn new() -> Self {
        Annotations(Vec::new())
    }

    pub fn push(&mut self, annotation: Annotation) {
        self.0.push(annotation);
    }

    pub fn concat(&mut self, other: Annotations) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Annotation> {
        self.0.iter()
    }

    /// All annotations with the given id, in declaration order.
    pub fn by_id<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Annotation> {
        self.0.iter().filter(move |a| a.id == id)
    }

    pub fn first_by_id<'a>(&'a self, id: &'a str) -> Option<&'a Annotation> {
        self.by_id(id).next()
    }

    /// Drains the collection, leaving it empty.
    pub fn take(&mut self) -> Annotations {
        Annotations(std::mem::take(&mut self.0))
    }
}

impl FromIterator<Annotation> for Annotations {
    fn from_iter<T: IntoIterator<Item = Annotation>>(iter: T) -> Self {
        Annotations(iter.into_iter().collect())
    }
}
