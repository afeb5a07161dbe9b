//! Rendering of filter trees into SQLite and filtered random sampling.
//!
//! Every query selects from `posts p JOIN publics pb`, one row per post, so
//! `ORDER BY RANDOM() LIMIT 1` draws uniformly from the matching set. Crop
//! constraints never join into the outer query; they are rendered as
//! correlated `EXISTS` / `COUNT` subqueries.

use rusqlite::types::Value as SqlValue;

use super::models::format_date;
use super::{Database, Post, Sampled};
use crate::error::MixResult;
use crate::filter::{CountDimension, CountFilter, Field, Predicate, Value};

#[derive(Debug, Default)]
pub struct SqlBuilder {
    sql: String,
    params: Vec<SqlValue>,
}

impl SqlBuilder {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }

    fn push(&mut self, fragment: &str) {
        self.sql.push_str(fragment);
    }

    fn bind(&mut self, value: SqlValue) {
        self.sql.push('?');
        self.params.push(value);
    }

    fn join<T>(&mut self, items: &[T], separator: &str, mut each: impl FnMut(&mut Self, &T)) {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.push(separator);
            }
            each(self, item);
        }
    }
}

fn column(field: Field) -> &'static str {
    match field {
        Field::PublicDomain => "pb.domain",
        Field::PostId => "p.id",
        Field::PostDate => "p.date",
        Field::CropText => "fc.text",
    }
}

fn sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Int(v) => SqlValue::Integer(*v),
        Value::Text(v) => SqlValue::Text(v.clone()),
        Value::Timestamp(v) => SqlValue::Text(format_date(v)),
    }
}

fn like_pattern(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len() + 2);
    escaped.push('%');
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Wrap crop-scoped conditions in an existence check over the post's crops.
fn scoped(b: &mut SqlBuilder, field: Field, condition: impl FnOnce(&mut SqlBuilder)) {
    if field == Field::CropText {
        b.push(
            "EXISTS (SELECT 1 FROM pictures fm JOIN crops fc ON fc.picture_id = fm.id \
             WHERE fm.post_id = p.id AND ",
        );
        condition(b);
        b.push(")");
    } else {
        condition(b);
    }
}

pub fn render_predicate(predicate: &Predicate, b: &mut SqlBuilder) {
    match predicate {
        Predicate::Compare { field, op, value } => scoped(b, *field, |b| {
            b.push(column(*field));
            b.push(" ");
            b.push(op.as_sql());
            b.push(" ");
            b.bind(sql_value(value));
        }),
        Predicate::In { field, values } => {
            if values.is_empty() {
                b.push("0");
                return;
            }
            scoped(b, *field, |b| {
                b.push(column(*field));
                b.push(" IN (");
                b.join(values, ", ", |b, v| b.bind(sql_value(v)));
                b.push(")");
            })
        }
        Predicate::Contains { field, pattern } => scoped(b, *field, |b| {
            b.push(column(*field));
            b.push(" LIKE ");
            b.bind(SqlValue::Text(like_pattern(pattern)));
            b.push(" ESCAPE '\\'");
        }),
        Predicate::Not(inner) => {
            b.push("NOT (");
            render_predicate(inner, b);
            b.push(")");
        }
        Predicate::And(nodes) => {
            if nodes.is_empty() {
                b.push("1");
                return;
            }
            b.push("(");
            b.join(nodes, " AND ", |b, n| render_predicate(n, b));
            b.push(")");
        }
        Predicate::Or(nodes) => {
            if nodes.is_empty() {
                b.push("0");
                return;
            }
            b.push("(");
            b.join(nodes, " OR ", |b, n| render_predicate(n, b));
            b.push(")");
        }
    }
}

pub fn render_count(filter: &CountFilter, b: &mut SqlBuilder) {
    match filter.dimension {
        CountDimension::Pictures => {
            b.push("(SELECT COUNT(*) FROM pictures cp WHERE cp.post_id = p.id) ");
            b.push(filter.op.as_sql());
            b.push(" ");
            b.bind(SqlValue::Integer(i64::from(filter.value)));
        }
        // Uncropped pictures never count, whatever the comparison.
        CountDimension::Crops => {
            b.push(
                "EXISTS (SELECT 1 FROM pictures cm WHERE cm.post_id = p.id \
                 AND EXISTS (SELECT 1 FROM crops ce WHERE ce.picture_id = cm.id) \
                 AND (SELECT COUNT(*) FROM crops cc WHERE cc.picture_id = cm.id) ",
            );
            b.push(filter.op.as_sql());
            b.push(" ");
            b.bind(SqlValue::Integer(i64::from(filter.value)));
            b.push(")");
        }
    }
}

/// `SELECT p.id ... WHERE <predicate> AND <every count filter>`.
pub fn select_post_ids(predicate: Option<&Predicate>, counts: &[CountFilter]) -> SqlBuilder {
    let mut b = SqlBuilder::default();
    b.push("SELECT p.id FROM posts p JOIN publics pb ON pb.id = p.public_id WHERE 1");
    if let Some(predicate) = predicate {
        b.push(" AND ");
        render_predicate(predicate, &mut b);
    }
    for filter in counts {
        b.push(" AND ");
        render_count(filter, &mut b);
    }
    b
}

impl Database {
    /// Ids of every post matching the filters, ascending.
    pub fn matching_post_ids(
        &self,
        predicate: Option<&Predicate>,
        counts: &[CountFilter],
    ) -> MixResult<Vec<i64>> {
        let mut query = select_post_ids(predicate, counts);
        query.push(" ORDER BY p.id");
        let mut stmt = self.conn.prepare(query.sql())?;
        let ids = stmt
            .query_map(rusqlite::params_from_iter(query.params()), |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    /// Draw one matching post uniformly at random.
    pub fn sample_post(
        &self,
        predicate: Option<&Predicate>,
        counts: &[CountFilter],
    ) -> MixResult<Sampled<Post>> {
        let mut query = select_post_ids(predicate, counts);
        query.push(" ORDER BY RANDOM() LIMIT 1");
        tracing::debug!("Sampling post: {}", query.sql());

        let mut stmt = self.conn.prepare(query.sql())?;
        let mut rows = stmt.query(rusqlite::params_from_iter(query.params()))?;
        let id: i64 = match rows.next()? {
            Some(row) => row.get(0)?,
            None => return Ok(Sampled::NotFound),
        };
        Ok(Sampled::Found(self.get_post(id)?))
    }
}
