//! PostgreSQL SQL text for the insert-if-absent load.

use crate::core::TargetTable;

/// Bind parameters per statement are capped by the wire protocol (u16).
pub const MAX_BIND_PARAMS: usize = 65_535;

/// Columns of a table in attribute order with their base type names.
///
/// Type modifiers are omitted so a cast never truncates; the insert itself
/// enforces length and precision and reports violations per row.
pub const TABLE_COLUMNS_SQL: &str = "\
SELECT a.attname::text, format_type(a.atttypid, NULL) \
FROM pg_catalog.pg_attribute a \
WHERE a.attrelid = $1::text::regclass AND a.attnum > 0 AND NOT a.attisdropped \
ORDER BY a.attnum";

/// Quote an identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quoted `schema.table`, or just the table when unqualified.
pub fn qualify(table: &TargetTable) -> String {
    match &table.schema {
        Some(schema) => format!("{}.{}", quote_ident(schema), quote_ident(&table.name)),
        None => quote_ident(&table.name),
    }
}

/// How many rows one statement can carry for a given column count.
pub fn max_rows_per_statement(column_count: usize) -> usize {
    (MAX_BIND_PARAMS / column_count.max(1)).max(1)
}

/// Set-based insert-if-absent for `rows` rows.
///
/// Every parameter is bound as text and cast to the column's type, so
/// `columns` and `types` must be the same length. Rows whose identity
/// already exists in the target are skipped by the `NOT EXISTS` filter.
pub fn build_insert_if_absent(
    table: &TargetTable,
    columns: &[String],
    types: &[String],
    identity_idx: usize,
    rows: usize,
) -> String {
    let target = qualify(table);
    let quoted: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    let col_list = quoted.join(", ");
    let select_list = quoted
        .iter()
        .map(|c| format!("s.{}", c))
        .collect::<Vec<_>>()
        .join(", ");

    let width = columns.len();
    let tuples = (0..rows)
        .map(|r| {
            let casts = types
                .iter()
                .enumerate()
                .map(|(c, ty)| format!("CAST(${}::text AS {})", r * width + c + 1, ty))
                .collect::<Vec<_>>()
                .join(", ");
            format!("({})", casts)
        })
        .collect::<Vec<_>>()
        .join(", ");

    let identity = &quoted[identity_idx];
    format!(
        "INSERT INTO {target} ({col_list}) \
         SELECT {select_list} FROM (VALUES {tuples}) AS s ({col_list}) \
         WHERE NOT EXISTS (SELECT 1 FROM {target} d WHERE d.{identity} = s.{identity})"
    )
}
