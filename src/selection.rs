use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::{ClassId, Subject, Unit};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CheckState {
    Checked,
    Unchecked,
    Indeterminate,
}

impl CheckState {
    fn from_counts(selected: usize, total: usize) -> Self {
        if total == 0 || selected == 0 {
            CheckState::Unchecked
        } else if selected == total {
            CheckState::Checked
        } else {
            CheckState::Indeterminate
        }
    }
}

/// Checked leaf classes. Unit and subject states are always derived from
/// this set and never stored, so the order of toggles cannot skew them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Selection {
    classes: BTreeSet<ClassId>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_selected(&self, class_id: &str) -> bool {
        self.classes.contains(class_id)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn class_ids(&self) -> impl Iterator<Item = &str> {
        self.classes.iter().map(String::as_str)
    }

    pub fn set_class(&mut self, class_id: &str, checked: bool) {
        if checked {
            self.classes.insert(class_id.to_string());
        } else {
            self.classes.remove(class_id);
        }
    }

    pub fn set_unit(&mut self, unit: &Unit, checked: bool) {
        for class in &unit.classes {
            self.set_class(&class.id, checked);
        }
    }

    pub fn set_subject(&mut self, subject: &Subject, checked: bool) {
        for unit in &subject.units {
            self.set_unit(unit, checked);
        }
    }

    pub fn clear(&mut self) {
        self.classes.clear();
    }

    pub fn unit_state(&self, unit: &Unit) -> CheckState {
        let selected = unit
            .classes
            .iter()
            .filter(|class| self.is_selected(&class.id))
            .count();
        CheckState::from_counts(selected, unit.classes.len())
    }

    /// Units without classes do not count towards the subject state.
    pub fn subject_state(&self, subject: &Subject) -> CheckState {
        let (selected, total) = subject
            .units
            .iter()
            .flat_map(|unit| unit.classes.iter())
            .fold((0, 0), |(selected, total), class| {
                (selected + usize::from(self.is_selected(&class.id)), total + 1)
            });
        CheckState::from_counts(selected, total)
    }
}

impl FromIterator<ClassId> for Selection {
    fn from_iter<I: IntoIterator<Item = ClassId>>(iter: I) -> Self {
        Self {
            classes: iter.into_iter().collect(),
        }
    }
}
