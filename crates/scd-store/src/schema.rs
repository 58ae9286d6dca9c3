//! DDL for SCD tables.

use scd_query::sql::quote_ident;
use scd_types::TableDef;

/// `CREATE TABLE` plus indexes for one entity table. Idempotent.
///
/// Envelope columns come first; timestamps are integer microseconds since
/// the UNIX epoch. Reference columns become foreign keys to the referenced
/// table's `surrogate_key`.
pub fn create_table_sql(table: &TableDef) -> String {
    let name = quote_ident(table.name);
    let mut lines = vec![
        format!("{} TEXT PRIMARY KEY NOT NULL", quote_ident("surrogate_key")),
        format!("{} TEXT NOT NULL", quote_ident("business_key")),
        format!(
            "{v} INTEGER NOT NULL CHECK ({v} >= 1)",
            v = quote_ident("version")
        ),
        format!("{} INTEGER NOT NULL", quote_ident("valid_from")),
        format!("{} INTEGER", quote_ident("valid_to")),
    ];
    for column in table.columns {
        let mut line = format!("{} {} NOT NULL", quote_ident(column.name), column.kind.sql_type());
        if let Some(target) = column.references {
            line.push_str(&format!(
                " REFERENCES {}({})",
                quote_ident(target),
                quote_ident("surrogate_key")
            ));
        }
        lines.push(line);
    }
    lines.push(format!(
        "UNIQUE ({}, {})",
        quote_ident("business_key"),
        quote_ident("version")
    ));

    let mut sql = format!(
        "CREATE TABLE IF NOT EXISTS {name} (\n    {}\n);\n",
        lines.join(",\n    ")
    );
    sql.push_str(&format!(
        "CREATE INDEX IF NOT EXISTS {} ON {name} ({}) WHERE {} IS NULL;\n",
        quote_ident(&format!("idx_{}_latest", table.name)),
        quote_ident("business_key"),
        quote_ident("valid_to"),
    ));
    sql.push_str(&format!(
        "CREATE INDEX IF NOT EXISTS {} ON {name} ({});\n",
        quote_ident(&format!("idx_{}_business_key", table.name)),
        quote_ident("business_key"),
    ));
    sql
}

/// `DROP TABLE` for one entity table. Indexes go with it.
pub fn drop_table_sql(table: &TableDef) -> String {
    format!("DROP TABLE IF EXISTS {};\n", quote_ident(table.name))
}

/// Full "up" script for `tables`, in the order given.
pub fn up_script(tables: &[TableDef]) -> String {
    tables.iter().map(create_table_sql).collect()
}

/// Full "down" script for `tables`, in reverse order.
pub fn down_script(tables: &[TableDef]) -> String {
    tables.iter().rev().map(drop_table_sql).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scd_types::Column;

    const COLUMNS: &[Column] = &[Column::real("amount"), Column::reference("job_uid", "jobs")];
    const TABLE: TableDef = TableDef::new("payments", COLUMNS);
    const JOBS: TableDef = TableDef::new("jobs", &[]);

    #[test]
    fn create_declares_constraints_and_indexes() {
        let sql = create_table_sql(&TABLE);
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS \"payments\""));
        assert!(sql.contains("\"surrogate_key\" TEXT PRIMARY KEY NOT NULL"));
        assert!(sql.contains("\"valid_to\" INTEGER,"));
        assert!(sql.contains("\"amount\" REAL NOT NULL"));
        assert!(sql.contains("\"job_uid\" TEXT NOT NULL REFERENCES \"jobs\"(\"surrogate_key\")"));
        assert!(sql.contains("UNIQUE (\"business_key\", \"version\")"));
        assert!(sql.contains("\"idx_payments_latest\" ON \"payments\" (\"business_key\") WHERE \"valid_to\" IS NULL"));
        assert!(sql.contains("\"idx_payments_business_key\""));
    }

    #[test]
    fn down_script_reverses_order() {
        let sql = down_script(&[JOBS, TABLE]);
        let payments = sql.find("\"payments\"").unwrap();
        let jobs = sql.find("\"jobs\"").unwrap();
        assert!(payments < jobs);
    }
}
