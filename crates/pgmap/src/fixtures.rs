//! Hand-written models for unit tests (the derive cannot be used inside this crate).

use crate::error::OrmResult;
use crate::field::{Field, FieldKind, single_from_related};
use crate::model::{FieldShape, Model, ModelRef, ModelShape, RelationHint, push_value};
use crate::scan::{Node, Related};
use crate::value::Value;

macro_rules! model_field {
    ($name:ident) => {
        impl Field for $name {
            fn kind() -> FieldKind {
                FieldKind::One {
                    target: ModelRef::of::<Self>(),
                    optional: false,
                }
            }

            fn from_node(node: &Node) -> OrmResult<Self> {
                <Self as Model>::decode(node)
            }

            fn from_related(related: Option<&Related>) -> OrmResult<Self> {
                single_from_related(related)
            }
        }
    };
}

/// Implement `Model` from a shape alone, for registry tests.
#[macro_export]
#[doc(hidden)]
macro_rules! shape_only_model {
    ($name:ident, $shape:expr) => {
        impl $crate::Model for $name {
            fn shape() -> $crate::ModelShape {
                $shape
            }

            fn decode(_: &$crate::Node) -> $crate::OrmResult<Self> {
                Err($crate::OrmError::Other("shape-only model".into()))
            }

            fn to_values(&self) -> $crate::OrmResult<Vec<(&'static str, $crate::Value)>> {
                Ok(Vec::new())
            }

            fn apply_node(&mut self, _: &$crate::Node) -> $crate::OrmResult<()> {
                Ok(())
            }
        }
    };
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub emails: Vec<String>,
}

impl Model for User {
    fn shape() -> ModelShape {
        ModelShape::new("User")
            .field(FieldShape::new("id", <i64 as Field>::kind()))
            .field(FieldShape::new("name", <String as Field>::kind()))
            .field(FieldShape::new("emails", <Vec<String> as Field>::kind()))
    }

    fn decode(node: &Node) -> OrmResult<Self> {
        Ok(Self {
            id: node.get("id")?,
            name: node.get("name")?,
            emails: node.get("emails")?,
        })
    }

    fn to_values(&self) -> OrmResult<Vec<(&'static str, Value)>> {
        let mut values = Vec::new();
        push_value(&mut values, "id", &self.id)?;
        push_value(&mut values, "name", &self.name)?;
        push_value(&mut values, "emails", &self.emails)?;
        Ok(values)
    }

    fn apply_node(&mut self, node: &Node) -> OrmResult<()> {
        node.assign("id", &mut self.id)?;
        node.assign("name", &mut self.name)?;
        node.assign("emails", &mut self.emails)?;
        Ok(())
    }
}
model_field!(User);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Story {
    pub id: i64,
    pub title: String,
    pub author_id: i64,
    pub author: Option<User>,
    pub comments: Vec<Comment>,
    pub tags: Vec<Tag>,
}

impl Model for Story {
    fn shape() -> ModelShape {
        ModelShape::new("Story")
            .field(FieldShape::new("id", <i64 as Field>::kind()))
            .field(FieldShape::new("title", <String as Field>::kind()))
            .field(FieldShape::new("author_id", <i64 as Field>::kind()))
            .field(FieldShape::new("author", <Option<User> as Field>::kind()))
            .field(FieldShape::new("comments", <Vec<Comment> as Field>::kind()))
            .field(FieldShape::new("tags", <Vec<Tag> as Field>::kind()))
    }

    fn decode(node: &Node) -> OrmResult<Self> {
        Ok(Self {
            id: node.get("id")?,
            title: node.get("title")?,
            author_id: node.get("author_id")?,
            author: node.get("author")?,
            comments: node.get("comments")?,
            tags: node.get("tags")?,
        })
    }

    fn to_values(&self) -> OrmResult<Vec<(&'static str, Value)>> {
        let mut values = Vec::new();
        push_value(&mut values, "id", &self.id)?;
        push_value(&mut values, "title", &self.title)?;
        push_value(&mut values, "author_id", &self.author_id)?;
        push_value(&mut values, "author", &self.author)?;
        push_value(&mut values, "comments", &self.comments)?;
        push_value(&mut values, "tags", &self.tags)?;
        Ok(values)
    }

    fn apply_node(&mut self, node: &Node) -> OrmResult<()> {
        node.assign("id", &mut self.id)?;
        node.assign("title", &mut self.title)?;
        node.assign("author_id", &mut self.author_id)?;
        Ok(())
    }
}
model_field!(Story);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Comment {
    pub id: i64,
    pub story_id: i64,
    pub author_id: Option<i64>,
    pub body: String,
    pub author: Option<User>,
    pub story: Option<Box<Story>>,
}

impl Model for Comment {
    fn shape() -> ModelShape {
        ModelShape::new("Comment")
            .field(FieldShape::new("id", <i64 as Field>::kind()))
            .field(FieldShape::new("story_id", <i64 as Field>::kind()))
            .field(FieldShape::new("author_id", <Option<i64> as Field>::kind()))
            .field(FieldShape::new("body", <String as Field>::kind()))
            .field(FieldShape::new("author", <Option<User> as Field>::kind()))
            .field(
                FieldShape::new("story", <Option<Box<Story>> as Field>::kind())
                    .relation(RelationHint::BelongsTo),
            )
    }

    fn decode(node: &Node) -> OrmResult<Self> {
        Ok(Self {
            id: node.get("id")?,
            story_id: node.get("story_id")?,
            author_id: node.get("author_id")?,
            body: node.get("body")?,
            author: node.get("author")?,
            story: node.get("story")?,
        })
    }

    fn to_values(&self) -> OrmResult<Vec<(&'static str, Value)>> {
        let mut values = Vec::new();
        push_value(&mut values, "id", &self.id)?;
        push_value(&mut values, "story_id", &self.story_id)?;
        push_value(&mut values, "author_id", &self.author_id)?;
        push_value(&mut values, "body", &self.body)?;
        Ok(values)
    }

    fn apply_node(&mut self, node: &Node) -> OrmResult<()> {
        node.assign("id", &mut self.id)?;
        node.assign("story_id", &mut self.story_id)?;
        node.assign("author_id", &mut self.author_id)?;
        node.assign("body", &mut self.body)?;
        Ok(())
    }
}
model_field!(Comment);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

impl Model for Tag {
    fn shape() -> ModelShape {
        ModelShape::new("Tag")
            .field(FieldShape::new("id", <i64 as Field>::kind()))
            .field(FieldShape::new("name", <String as Field>::kind()))
    }

    fn decode(node: &Node) -> OrmResult<Self> {
        Ok(Self {
            id: node.get("id")?,
            name: node.get("name")?,
        })
    }

    fn to_values(&self) -> OrmResult<Vec<(&'static str, Value)>> {
        let mut values = Vec::new();
        push_value(&mut values, "id", &self.id)?;
        push_value(&mut values, "name", &self.name)?;
        Ok(values)
    }

    fn apply_node(&mut self, node: &Node) -> OrmResult<()> {
        node.assign("id", &mut self.id)?;
        node.assign("name", &mut self.name)?;
        Ok(())
    }
}
model_field!(Tag);

crate::join_table!(Story, Tag, "story_tags", "story_id", "tag_id");

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Person {
    pub id: i64,
    pub name: String,
    pub profile: Option<Profile>,
}

impl Model for Person {
    fn shape() -> ModelShape {
        ModelShape::new("Person")
            .table("people")
            .field(FieldShape::new("id", <i64 as Field>::kind()))
            .field(FieldShape::new("name", <String as Field>::kind()))
            .field(FieldShape::new("profile", <Option<Profile> as Field>::kind()))
    }

    fn decode(node: &Node) -> OrmResult<Self> {
        Ok(Self {
            id: node.get("id")?,
            name: node.get("name")?,
            profile: node.get("profile")?,
        })
    }

    fn to_values(&self) -> OrmResult<Vec<(&'static str, Value)>> {
        let mut values = Vec::new();
        push_value(&mut values, "id", &self.id)?;
        push_value(&mut values, "name", &self.name)?;
        Ok(values)
    }

    fn apply_node(&mut self, node: &Node) -> OrmResult<()> {
        node.assign("id", &mut self.id)?;
        node.assign("name", &mut self.name)?;
        Ok(())
    }
}
model_field!(Person);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Profile {
    pub id: i64,
    pub person_id: i64,
    pub bio: Option<String>,
}

impl Model for Profile {
    fn shape() -> ModelShape {
        ModelShape::new("Profile")
            .field(FieldShape::new("id", <i64 as Field>::kind()))
            .field(FieldShape::new("person_id", <i64 as Field>::kind()))
            .field(FieldShape::new("bio", <Option<String> as Field>::kind()))
    }

    fn decode(node: &Node) -> OrmResult<Self> {
        Ok(Self {
            id: node.get("id")?,
            person_id: node.get("person_id")?,
            bio: node.get("bio")?,
        })
    }

    fn to_values(&self) -> OrmResult<Vec<(&'static str, Value)>> {
        let mut values = Vec::new();
        push_value(&mut values, "id", &self.id)?;
        push_value(&mut values, "person_id", &self.person_id)?;
        push_value(&mut values, "bio", &self.bio)?;
        Ok(values)
    }

    fn apply_node(&mut self, node: &Node) -> OrmResult<()> {
        node.assign("id", &mut self.id)?;
        node.assign("person_id", &mut self.person_id)?;
        node.assign("bio", &mut self.bio)?;
        Ok(())
    }
}
model_field!(Profile);
