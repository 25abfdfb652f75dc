//! Structured diff between two models, step emission in a fixed total
//! order, and rollback-plan generation.

use crate::model::{Column, ForeignKeyDef, IndexDef, Model, Table};
use crate::step::{ColumnChanges, Step};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Added {
    pub tables: Vec<String>,
    pub columns: Vec<(String, String)>,
    pub indexes: Vec<(String, String)>,
    pub foreign_keys: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Removed {
    pub tables: Vec<String>,
    pub columns: Vec<(String, String)>,
    pub indexes: Vec<(String, String)>,
    pub foreign_keys: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModifiedColumn {
    pub table: String,
    pub column: String,
    pub before: Column,
    pub after: Column,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Modified {
    pub columns: Vec<ModifiedColumn>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diff {
    pub added: Added,
    pub removed: Removed,
    pub modified: Modified,
}

/// Phase 1: the structured diff between two resolved models.
pub fn compute_diff(from: &Model, to: &Model) -> Diff {
    let mut diff = Diff::default();

    for (name, _) in &to.tables {
        if from.table(name).is_none() {
            diff.added.tables.push(name.clone());
        }
    }
    for (name, _) in &from.tables {
        if to.table(name).is_none() {
            diff.removed.tables.push(name.clone());
        }
    }

    for (name, from_table) in &from.tables {
        let Some(to_table) = to.table(name) else {
            continue;
        };
        diff_table(name, from_table, to_table, &mut diff);
    }

    diff
}

fn diff_table(table: &str, from_table: &Table, to_table: &Table, diff: &mut Diff) {
    let mut removed_columns = Vec::new();

    for (col_name, _) in &from_table.columns {
        if to_table.column(col_name).is_none() {
            diff.removed.columns.push((table.to_string(), col_name.clone()));
            removed_columns.push(col_name.clone());
        }
    }
    for (col_name, to_col) in &to_table.columns {
        match from_table.column(col_name) {
            None => diff.added.columns.push((table.to_string(), col_name.clone())),
            Some(from_col) => {
                if from_col != to_col {
                    diff.modified.columns.push(ModifiedColumn {
                        table: table.to_string(),
                        column: col_name.clone(),
                        before: from_col.clone(),
                        after: to_col.clone(),
                    });
                }
            }
        }
    }

    for idx in &from_table.indexes {
        let removed_by_name = !to_table.indexes.iter().any(|i| i.name == idx.name);
        let removed_by_column = idx.columns.iter().any(|c| removed_columns.contains(c));
        if removed_by_name || removed_by_column {
            diff.removed
                .indexes
                .push((table.to_string(), idx.name.clone()));
        }
    }
    for idx in &to_table.indexes {
        if !from_table.indexes.iter().any(|i| i.name == idx.name) {
            diff.added.indexes.push((table.to_string(), idx.name.clone()));
        }
    }

    for fk in &from_table.foreign_keys {
        if !to_table.foreign_keys.iter().any(|f| f.name == fk.name) {
            diff.removed
                .foreign_keys
                .push((table.to_string(), fk.name.clone()));
        }
    }
    for fk in &to_table.foreign_keys {
        if !from_table.foreign_keys.iter().any(|f| f.name == fk.name) {
            diff.added
                .foreign_keys
                .push((table.to_string(), fk.name.clone()));
        }
    }
}

/// Phase 2: emits steps in the fixed total order the contract requires.
pub fn plan(from: &Model, to: &Model) -> Vec<Step> {
    let diff = compute_diff(from, to);
    let mut steps = Vec::new();

    // 1. add_table, columns inline; indexes and foreign keys follow later phases.
    for table_name in &diff.added.tables {
        let table = to.table(table_name).expect("added table exists in `to`");
        steps.push(Step::AddTable {
            table: table_name.clone(),
            columns: table.columns.clone(),
        });
    }

    // 2. add_column, for pre-existing tables only.
    for (table_name, column_name) in &diff.added.columns {
        let table = to.table(table_name).expect("table exists in `to`");
        let column = table.column(column_name).expect("column exists in `to`");
        steps.push(Step::AddColumn {
            table: table_name.clone(),
            column: column.clone(),
        });
    }

    // 3. modify_column; the changes record carries only the fields that
    // actually differ.
    for modified in &diff.modified.columns {
        steps.push(Step::ModifyColumn {
            table: modified.table.clone(),
            column: modified.column.clone(),
            changes: compute_changes(&modified.before, &modified.after),
        });
    }

    // 4. add_index, on both new and existing tables.
    for (table_name, index_name) in &diff.added.indexes {
        let table = to.table(table_name).expect("table exists in `to`");
        let index = find_index(table, index_name).expect("index exists in `to`");
        steps.push(Step::AddIndex {
            table: table_name.clone(),
            index: index.clone(),
        });
    }
    for table_name in &diff.added.tables {
        let table = to.table(table_name).expect("added table exists in `to`");
        for index in &table.indexes {
            steps.push(Step::AddIndex {
                table: table_name.clone(),
                index: index.clone(),
            });
        }
    }

    // 5. add_foreign_key, on both new and existing tables.
    for (table_name, fk_name) in &diff.added.foreign_keys {
        let table = to.table(table_name).expect("table exists in `to`");
        let fk = find_foreign_key(table, fk_name).expect("foreign key exists in `to`");
        steps.push(Step::AddForeignKey {
            table: table_name.clone(),
            foreign_key: fk.clone(),
        });
    }
    for table_name in &diff.added.tables {
        let table = to.table(table_name).expect("added table exists in `to`");
        for fk in &table.foreign_keys {
            steps.push(Step::AddForeignKey {
                table: table_name.clone(),
                foreign_key: fk.clone(),
            });
        }
    }

    // 6. drop_foreign_key.
    for (table_name, fk_name) in &diff.removed.foreign_keys {
        steps.push(Step::DropForeignKey {
            table: table_name.clone(),
            foreign_key: fk_name.clone(),
        });
    }
    for table_name in &diff.removed.tables {
        let table = from.table(table_name).expect("removed table exists in `from`");
        for fk in &table.foreign_keys {
            steps.push(Step::DropForeignKey {
                table: table_name.clone(),
                foreign_key: fk.name.clone(),
            });
        }
    }

    // 7. drop_index.
    for (table_name, index_name) in &diff.removed.indexes {
        steps.push(Step::DropIndex {
            table: table_name.clone(),
            index: index_name.clone(),
        });
    }
    for table_name in &diff.removed.tables {
        let table = from.table(table_name).expect("removed table exists in `from`");
        for index in &table.indexes {
            steps.push(Step::DropIndex {
                table: table_name.clone(),
                index: index.name.clone(),
            });
        }
    }

    // 8. drop_column.
    for (table_name, column_name) in &diff.removed.columns {
        steps.push(Step::DropColumn {
            table: table_name.clone(),
            column: column_name.clone(),
        });
    }

    // 9. drop_table.
    for table_name in &diff.removed.tables {
        steps.push(Step::DropTable {
            table: table_name.clone(),
        });
    }

    steps
}

fn compute_changes(before: &Column, after: &Column) -> ColumnChanges {
    ColumnChanges {
        sql_type: (before.sql_type != after.sql_type).then(|| after.sql_type.clone()),
        nullable: (before.nullable != after.nullable).then_some(after.nullable),
        default: (before.default != after.default).then(|| after.default.clone()),
    }
}

fn find_index<'a>(table: &'a Table, name: &str) -> Option<&'a IndexDef> {
    table.indexes.iter().find(|i| i.name == name)
}

fn find_foreign_key<'a>(table: &'a Table, name: &str) -> Option<&'a ForeignKeyDef> {
    table.foreign_keys.iter().find(|f| f.name == name)
}

/// Phase 3: the inverse plan, resolved against `from`. Steps whose rollback
/// would require information `from` doesn't carry are silently omitted --
/// the planner never fabricates a pre-image it cannot prove.
pub fn rollback(forward: &[Step], from: &Model) -> Vec<Step> {
    forward
        .iter()
        .rev()
        .filter_map(|step| invert(step, from))
        .collect()
}

fn invert(step: &Step, from: &Model) -> Option<Step> {
    match step {
        Step::AddTable { table, .. } => Some(Step::DropTable {
            table: table.clone(),
        }),
        Step::DropTable { table } => {
            let original = from.table(table)?;
            Some(Step::AddTable {
                table: table.clone(),
                columns: original.columns.clone(),
            })
        }
        Step::AddColumn { table, column } => Some(Step::DropColumn {
            table: table.clone(),
            column: column.name.clone(),
        }),
        Step::DropColumn { table, column } => {
            let original = from.table(table)?.column(column)?;
            Some(Step::AddColumn {
                table: table.clone(),
                column: original.clone(),
            })
        }
        Step::ModifyColumn {
            table,
            column,
            changes,
        } => {
            let original = from.table(table)?.column(column)?;
            let inverse = ColumnChanges {
                sql_type: changes.sql_type.as_ref().map(|_| original.sql_type.clone()),
                nullable: changes.nullable.map(|_| original.nullable),
                default: changes.default.as_ref().map(|_| original.default.clone()),
            };
            Some(Step::ModifyColumn {
                table: table.clone(),
                column: column.clone(),
                changes: inverse,
            })
        }
        Step::RenameColumn { table, from: f, to } => Some(Step::RenameColumn {
            table: table.clone(),
            from: to.clone(),
            to: f.clone(),
        }),
        Step::AddIndex { table, index } => Some(Step::DropIndex {
            table: table.clone(),
            index: index.name.clone(),
        }),
        Step::DropIndex { table, index } => {
            let original = find_index(from.table(table)?, index)?;
            Some(Step::AddIndex {
                table: table.clone(),
                index: original.clone(),
            })
        }
        Step::AddForeignKey { table, foreign_key } => Some(Step::DropForeignKey {
            table: table.clone(),
            foreign_key: foreign_key.name.clone(),
        }),
        Step::DropForeignKey { table, foreign_key } => {
            let original = find_foreign_key(from.table(table)?, foreign_key)?;
            Some(Step::AddForeignKey {
                table: table.clone(),
                foreign_key: original.clone(),
            })
        }
    }
}
