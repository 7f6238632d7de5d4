//! Project field values and the per-item field updates built from them

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{ProjectConfig, SelectionIds};
use crate::item::{Column, Membership, Roster, TrackedItem};
use crate::{Error, Result};

/// Data type of a project field, from `ProjectV2FieldType`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    Date,
    Number,
    SingleSelect,
    Text,
    /// Built-in or unsupported types (TITLE, ASSIGNEES, ITERATION, ...)
    Other(String),
}

impl FieldKind {
    pub fn from_data_type(data_type: &str) -> Self {
        match data_type {
            "DATE" => FieldKind::Date,
            "NUMBER" => FieldKind::Number,
            "SINGLE_SELECT" => FieldKind::SingleSelect,
            "TEXT" => FieldKind::Text,
            other => FieldKind::Other(other.to_string()),
        }
    }
}

/// One option of a single-select field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub id: String,
    pub name: String,
}

/// A field defined on the project board
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectField {
    pub id: String,
    pub name: String,
    pub kind: FieldKind,
    pub options: Vec<SelectOption>,
}

/// Field kinds keyed by field ID
pub fn kinds_by_id(fields: &[ProjectField]) -> HashMap<String, FieldKind> {
    fields
        .iter()
        .map(|f| (f.id.clone(), f.kind.clone()))
        .collect()
}

/// A raw value read from a tracked item, before casting to a field type
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Timestamp(DateTime<Utc>),
}

/// A value in the shape of `ProjectV2FieldValue`
///
/// Serializes to the GraphQL input object, e.g. `{"date": "2024-03-01"}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldValue {
    Date(NaiveDate),
    Number(f64),
    SingleSelectOptionId(String),
    Text(String),
}

impl FieldValue {
    /// Cast a cell to the field's declared type
    ///
    /// Dates only keep day precision, which is all the board stores.
    pub fn cast(kind: &FieldKind, cell: CellValue) -> Result<Self> {
        let mismatch = |cell: &CellValue| {
            Error::Config(format!("Cannot write {:?} to a {:?} field", cell, kind))
        };

        match (kind, cell) {
            (FieldKind::Date, CellValue::Timestamp(ts)) => Ok(FieldValue::Date(ts.date_naive())),
            (FieldKind::Date, CellValue::Text(text)) => {
                let day = text.get(..10).unwrap_or(&text);
                NaiveDate::parse_from_str(day, "%Y-%m-%d")
                    .map(FieldValue::Date)
                    .map_err(|e| Error::Config(format!("Invalid date '{}': {}", text, e)))
            }
            (FieldKind::Number, CellValue::Number(n)) => Ok(FieldValue::Number(n)),
            (FieldKind::Number, CellValue::Text(text)) => text
                .trim()
                .parse()
                .map(FieldValue::Number)
                .map_err(|e| Error::Config(format!("Invalid number '{}': {}", text, e))),
            (FieldKind::SingleSelect, CellValue::Text(id)) => {
                Ok(FieldValue::SingleSelectOptionId(id))
            }
            (FieldKind::Text, CellValue::Text(text)) => Ok(FieldValue::Text(text)),
            (FieldKind::Text, CellValue::Number(n)) => Ok(FieldValue::Text(format_number(n))),
            (FieldKind::Text, CellValue::Timestamp(ts)) => {
                Ok(FieldValue::Text(ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()))
            }
            (FieldKind::Other(name), _) => Err(Error::Config(format!(
                "Project fields of type {} cannot be populated",
                name
            ))),
            (_, cell) => Err(mismatch(&cell)),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Set or clear one field of one project item
#[derive(Debug, Clone, PartialEq)]
pub struct FieldUpdate {
    pub item_id: String,
    pub field_id: String,
    /// `None` clears the field
    pub value: Option<FieldValue>,
}

/// Whose membership a single-select field describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Author,
    Commenter,
}

impl SelectionIds {
    /// Option ID for a membership category in the author/commenter field
    pub fn membership(&self, role: Role, membership: Membership) -> &str {
        match (role, membership) {
            (Role::Author, Membership::Peloton) => &self.author_peloton,
            (Role::Author, Membership::Bot) => &self.author_bot,
            (Role::Author, Membership::External) => &self.author_external,
            (Role::Commenter, Membership::Peloton) => &self.commenter_peloton,
            (Role::Commenter, Membership::Bot) => &self.commenter_bot,
            (Role::Commenter, Membership::External) => &self.commenter_external,
        }
    }
}

/// Everything needed to turn tracked items into field updates
#[derive(Debug, Clone, Copy)]
pub struct UpdateContext<'a> {
    pub project: &'a ProjectConfig,
    pub selections: &'a SelectionIds,
    pub roster: &'a Roster,
    pub kinds: &'a HashMap<String, FieldKind>,
}

impl UpdateContext<'_> {
    /// Read one column of a tracked item; `None` means the field is cleared
    pub fn cell(&self, item: &TrackedItem, column: Column) -> Option<CellValue> {
        let membership = |role: Role, actor| {
            let category = self.roster.categorise(actor);
            CellValue::Text(self.selections.membership(role, category).to_string())
        };

        match column {
            Column::CreatedAt => Some(CellValue::Timestamp(item.created_at)),
            Column::UpdatedAt => Some(CellValue::Timestamp(item.updated_at)),
            Column::ClosedAt => item.closed_at.map(CellValue::Timestamp),
            Column::FinalCommentLogin => {
                Some(CellValue::Text(item.final_comment.actor.login.clone()))
            }
            Column::FinalCommentTime => Some(CellValue::Timestamp(item.final_comment.at)),
            Column::TotalComments => Some(CellValue::Number(item.total_comments as f64)),
            Column::AuthorLogin => Some(CellValue::Text(item.author.login.clone())),
            Column::Votes => Some(CellValue::Number(item.votes as f64)),
            Column::AuthorMembership => Some(membership(Role::Author, &item.author)),
            Column::CommenterMembership => {
                Some(membership(Role::Commenter, &item.final_comment.actor))
            }
            Column::DiscussionWanted => item
                .discussion_wanted
                .then(|| CellValue::Text(self.selections.discussion_wanted.clone())),
        }
    }

    fn kind(&self, field_id: &str) -> Result<&FieldKind> {
        self.kinds.get(field_id).ok_or_else(|| {
            Error::Config(format!("Project has no field with ID {}", field_id))
        })
    }

    /// All field updates for one project item: the link field first, then
    /// every mapped field
    pub fn field_updates(&self, item_id: &str, item: &TrackedItem) -> Result<Vec<FieldUpdate>> {
        let mut updates = Vec::with_capacity(self.project.field_map.len() + 1);

        let link_field = &self.project.link_field;
        updates.push(FieldUpdate {
            item_id: item_id.to_string(),
            field_id: link_field.clone(),
            value: Some(FieldValue::cast(
                self.kind(link_field)?,
                CellValue::Text(item.node_id.clone()),
            )?),
        });

        for mapping in &self.project.field_map {
            let value = match self.cell(item, mapping.column) {
                Some(cell) => Some(FieldValue::cast(self.kind(&mapping.field)?, cell)?),
                None => None,
            };
            updates.push(FieldUpdate {
                item_id: item_id.to_string(),
                field_id: mapping.field.clone(),
                value,
            });
        }

        Ok(updates)
    }
}
