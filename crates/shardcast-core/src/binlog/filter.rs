//! Table filtering for binlog transactions
//!
//! DML statements carry their table in an embedded comment written by the
//! statement rewriter:
//!
//! ```text
//! insert into orders(id) values (1) /* _stream orders (id ) (1 ); */
//! ```
//!
//! The comment is the only source of table identity. The filter keeps:
//!
//! - SET statements, always (they must accompany any forwarded DML)
//! - DML statements whose table is in the requested set
//!
//! and drops DDL (logged), unparseable DML and unrecognized statements
//! (counted under [`TABLES_STREAM_LABEL`]), and control records. If no DML
//! matched, the transaction is forwarded with an empty statement list: the
//! envelope (timestamp, transaction id) always reaches the sink.

use super::sink::TransactionSink;
use crate::error::Result;
use crate::stats::{MetricsStreamErrors, StreamErrorCounter};
use shardcast_protocol::{BinlogTransaction, Category};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Marker preceding the table name in DML statements
pub const STREAM_COMMENT: &str = "/* _stream ";

/// Counter label for statements the tables filter could not parse
pub const TABLES_STREAM_LABEL: &str = "TablesStream";

/// Table name named by the last stream comment in `sql`.
///
/// `None` if there is no marker or the name is not terminated by a space.
pub fn extract_table_name(sql: &str) -> Option<&str> {
    let start = sql.rfind(STREAM_COMMENT)? + STREAM_COMMENT.len();
    let rest = &sql[start..];
    let end = rest.find(' ')?;
    Some(&rest[..end])
}

/// Sink decorator forwarding only the statements relevant to a table set
pub struct TablesFilter<S> {
    tables: HashSet<String>,
    sink: S,
    errors: Arc<dyn StreamErrorCounter>,
}

impl<S: TransactionSink> TablesFilter<S> {
    pub fn new<I, T>(tables: I, sink: S, errors: Arc<dyn StreamErrorCounter>) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            tables: tables.into_iter().map(Into::into).collect(),
            sink,
            errors,
        }
    }

    pub fn tables(&self) -> &HashSet<String> {
        &self.tables
    }

    pub fn into_inner(self) -> S {
        self.sink
    }

    fn parse_error(&self, sql: &str) {
        self.errors.add(TABLES_STREAM_LABEL, 1);
        error!("Error parsing table name: {}", sql);
    }
}

impl<S: TransactionSink> TransactionSink for TablesFilter<S> {
    fn send(&mut self, mut transaction: BinlogTransaction) -> Result<()> {
        let mut matched = false;
        let mut filtered = Vec::with_capacity(transaction.statements.len());

        for statement in std::mem::take(&mut transaction.statements) {
            match statement.category {
                Category::Set => filtered.push(statement),
                Category::Ddl => {
                    warn!("Not forwarding DDL: {}", statement.sql);
                }
                Category::Dml => {
                    let Some(table) = extract_table_name(&statement.sql) else {
                        self.parse_error(&statement.sql);
                        continue;
                    };
                    if self.tables.contains(table) {
                        matched = true;
                        filtered.push(statement);
                    }
                }
                Category::Unrecognized => self.parse_error(&statement.sql),
                Category::Error | Category::Begin | Category::Commit | Category::Rollback => {
                    debug!(
                        "Dropping {} record from table stream: {}",
                        statement.category, statement.sql
                    );
                }
            }
        }

        if matched {
            transaction.statements = filtered;
        }
        self.sink.send(transaction)
    }
}

/// Filter `sink` down to `tables`, counting parse errors through the
/// `metrics` facade.
pub fn tables_filter<I, T, S>(tables: I, sink: S) -> TablesFilter<S>
where
    I: IntoIterator<Item = T>,
    T: Into<String>,
    S: TransactionSink,
{
    TablesFilter::new(tables, sink, Arc::new(MetricsStreamErrors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binlog::CollectSink;
    use crate::error::CoreError;
    use crate::stats::AtomicStreamErrors;
    use shardcast_protocol::{Charset, Statement};

    fn stmt(category: Category, sql: &str) -> Statement {
        Statement::new(category, sql)
    }

    fn filter(tables: &[&str]) -> (TablesFilter<CollectSink>, Arc<AtomicStreamErrors>) {
        let counter = Arc::new(AtomicStreamErrors::new());
        let f = TablesFilter::new(tables.iter().copied(), CollectSink::default(), counter.clone());
        (f, counter)
    }

    fn run(f: TablesFilter<CollectSink>, tx: BinlogTransaction) -> BinlogTransaction {
        let mut f = f;
        f.send(tx).unwrap();
        f.into_inner().transactions.pop().unwrap()
    }

    #[test]
    fn test_extract_table_name() {
        assert_eq!(
            extract_table_name("insert into a(id) values (1) /* _stream a (id ) (1 ); */"),
            Some("a")
        );
        assert_eq!(extract_table_name("insert into a values (1)"), None);
        assert_eq!(extract_table_name("dml /* _stream included1"), None);
        assert_eq!(
            extract_table_name("/* _stream a (x) */ update /* _stream b (y) */"),
            Some("b")
        );
        assert_eq!(extract_table_name("/* _stream  (id)"), Some(""));
    }

    #[test]
    fn test_set_only_transaction_is_suppressed() {
        let (f, counter) = filter(&["included1"]);
        let tx = BinlogTransaction::new(1, "tx")
            .with_statement(stmt(Category::Set, "SET TIMESTAMP=1"))
            .with_statement(stmt(Category::Set, "SET INSERT_ID=2"));
        let out = run(f, tx);
        assert!(out.statements.is_empty());
        assert_eq!(out.timestamp, 1);
        assert_eq!(out.transaction_id, "tx");
        assert_eq!(counter.get(TABLES_STREAM_LABEL), 0);
    }

    #[test]
    fn test_matching_dml_keeps_interleaved_sets_in_order() {
        let (f, _) = filter(&["included1", "included2"]);
        let tx = BinlogTransaction::new(1, "tx")
            .with_statement(stmt(Category::Set, "set1"))
            .with_statement(stmt(Category::Dml, "dml1 /* _stream included1 (id ) (500 ); */"))
            .with_statement(stmt(Category::Set, "set2"))
            .with_statement(stmt(Category::Dml, "dml2 /* _stream excluded1 (id ) (500 ); */"));
        let out = run(f, tx);
        let sqls: Vec<&str> = out.statements.iter().map(|s| s.sql.as_str()).collect();
        assert_eq!(
            sqls,
            vec!["set1", "dml1 /* _stream included1 (id ) (500 ); */", "set2"]
        );
    }

    #[test]
    fn test_no_matching_dml_forwards_empty_envelope() {
        let (f, counter) = filter(&["included1"]);
        let tx = BinlogTransaction::new(9, "tx9")
            .with_statement(stmt(Category::Set, "set1"))
            .with_statement(stmt(Category::Dml, "dml1 /* _stream excluded1 (id ) (500 ); */"));
        let out = run(f, tx);
        assert!(out.statements.is_empty());
        assert_eq!(out.timestamp, 9);
        // a non-matching table is not an error
        assert_eq!(counter.get(TABLES_STREAM_LABEL), 0);
    }

    #[test]
    fn test_ddl_is_never_forwarded() {
        let (f, counter) = filter(&["included1"]);
        let tx = BinlogTransaction::new(1, "tx")
            .with_statement(stmt(Category::Ddl, "alter table included1 add column c int"))
            .with_statement(stmt(Category::Dml, "dml1 /* _stream included1 (id ) (1 ); */"));
        let out = run(f, tx);
        assert_eq!(out.statements.len(), 1);
        assert_eq!(out.statements[0].category, Category::Dml);
        assert_eq!(counter.get(TABLES_STREAM_LABEL), 0);
    }

    #[test]
    fn test_dml_without_marker_is_counted_and_dropped() {
        let (f, counter) = filter(&["included1"]);
        let tx = BinlogTransaction::new(1, "tx")
            .with_statement(stmt(Category::Dml, "insert into included1 values (1)"))
            .with_statement(stmt(Category::Dml, "dml1 /* _stream included1 (id ) (1 ); */"));
        let out = run(f, tx);
        assert_eq!(out.statements.len(), 1);
        assert_eq!(counter.get(TABLES_STREAM_LABEL), 1);
    }

    #[test]
    fn test_dml_without_terminating_space_is_counted() {
        let (f, counter) = filter(&["included1"]);
        let tx = BinlogTransaction::new(1, "tx")
            .with_statement(stmt(Category::Dml, "dml1 /* _stream included1"));
        let out = run(f, tx);
        assert!(out.statements.is_empty());
        assert_eq!(counter.get(TABLES_STREAM_LABEL), 1);
    }

    #[test]
    fn test_unrecognized_is_counted() {
        let (f, counter) = filter(&["included1"]);
        let tx = BinlogTransaction::new(1, "tx")
            .with_statement(stmt(Category::Unrecognized, "gibberish"))
            .with_statement(stmt(Category::Dml, "dml1 /* _stream included1 (id ) (1 ); */"));
        let out = run(f, tx);
        assert_eq!(out.statements.len(), 1);
        assert_eq!(counter.get(TABLES_STREAM_LABEL), 1);
    }

    #[test]
    fn test_control_records_are_dropped() {
        let (f, counter) = filter(&["included1"]);
        let tx = BinlogTransaction::new(1, "tx")
            .with_statement(stmt(Category::Begin, "BEGIN"))
            .with_statement(stmt(Category::Dml, "dml1 /* _stream included1 (id ) (1 ); */"))
            .with_statement(stmt(Category::Commit, "COMMIT"));
        let out = run(f, tx);
        assert_eq!(out.statements.len(), 1);
        assert_eq!(counter.get(TABLES_STREAM_LABEL), 0);
    }

    #[test]
    fn test_charset_is_preserved() {
        let (f, _) = filter(&["included1"]);
        let charset = Charset::new(120, 130, 140);
        let tx = BinlogTransaction::new(1, "tx").with_statement(
            stmt(Category::Dml, "dml1 /* _stream included1 (id ) (1 ); */").with_charset(charset),
        );
        let out = run(f, tx);
        assert_eq!(out.statements[0].charset, Some(charset));
    }

    #[test]
    fn test_sink_error_is_propagated() {
        let counter = Arc::new(AtomicStreamErrors::new());
        let mut f = TablesFilter::new(
            ["included1"],
            |_tx: BinlogTransaction| Err::<(), _>(CoreError::sink("downstream gone")),
            counter,
        );
        let err = f.send(BinlogTransaction::new(1, "tx")).unwrap_err();
        assert!(matches!(err, CoreError::Sink(_)));
    }

    #[test]
    fn test_filters_do_not_share_counters() {
        let (mut a, ca) = filter(&["t"]);
        let (mut b, cb) = filter(&["t"]);
        a.send(BinlogTransaction::new(1, "x").with_statement(stmt(Category::Unrecognized, "?")))
            .unwrap();
        b.send(BinlogTransaction::new(1, "y")).unwrap();
        assert_eq!(ca.get(TABLES_STREAM_LABEL), 1);
        assert_eq!(cb.get(TABLES_STREAM_LABEL), 0);
    }

    #[test]
    fn test_filters_stack() {
        let inner = tables_filter(["a", "b"], CollectSink::default());
        let mut outer = tables_filter(["b"], inner);
        outer
            .send(
                BinlogTransaction::new(1, "tx")
                    .with_statement(stmt(Category::Dml, "x /* _stream a (id ) */"))
                    .with_statement(stmt(Category::Dml, "y /* _stream b (id ) */")),
            )
            .unwrap();
        let got = outer.into_inner().into_inner().transactions;
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].statements.len(), 1);
        assert_eq!(got[0].statements[0].sql, "y /* _stream b (id ) */");
    }
}
