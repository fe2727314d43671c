//! Query Builder SELECT operations

use serde_json::Value as JsonValue;

use super::builder::SelectQuery;
use super::types::*;

impl SelectQuery {
    /// Add columns to the select list of the most recently added table
    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let items: Vec<SelectItem> = fields
            .into_iter()
            .map(|name| SelectItem::Column {
                name: name.into(),
                alias: None,
            })
            .collect();
        self.push_items(items);
        self
    }

    /// Add a raw expression, rendered as `(sql)`
    pub fn select_raw(mut self, sql: &str) -> Self {
        self.push_items(vec![SelectItem::Raw {
            sql: sql.to_string(),
            alias: None,
        }]);
        self
    }

    /// Add a HAVING predicate on `column`
    pub fn having(mut self, column: &str) -> Self {
        self.push_items(vec![SelectItem::Having(column.to_string())]);
        self
    }

    /// Alias the last select item of the most recently added table
    pub fn as_alias(mut self, alias: &str) -> Self {
        if let Some(item) = self
            .from
            .last_mut()
            .and_then(|entry| entry.select.last_mut())
        {
            item.set_alias(Some(alias.to_string()));
        }
        self
    }

    /// Add a function call; queued prefix functions wrap it, outermost first
    pub fn fun(mut self, function: Aggregate, args: Vec<FunArg>, alias: Option<&str>) -> Self {
        self.push_function(function, args, alias.map(str::to_string));
        self
    }

    /// `DISTINCT ON (...)` columns
    pub fn distinct_on<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.distinct_on = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    /// Apply `function` to the JSON aggregate. Scalar arguments are wrapped
    /// in a one-element array; objects and arrays are passed as they are.
    pub fn transform(mut self, function: &str, args: Option<JsonValue>) -> Self {
        let args = args.map(|args| match args {
            JsonValue::Object(_) | JsonValue::Array(_) => args,
            scalar => JsonValue::Array(vec![scalar]),
        });
        self.transform = Some(Transform {
            function: function.to_string(),
            args,
        });
        self
    }

    pub(crate) fn push_function(&mut self, function: Aggregate, args: Vec<FunArg>, alias: Option<String>) {
        let wrappers = std::mem::take(&mut self.fun_stack);
        self.push_items(vec![SelectItem::Function {
            function,
            args,
            alias,
            wrappers,
        }]);
    }

    fn push_items(&mut self, items: Vec<SelectItem>) {
        if items.is_empty() {
            return;
        }
        match self.from.last_mut() {
            Some(entry) => entry.select.extend(items),
            None => self.defer_error("select list given before any table"),
        }
    }
}

macro_rules! aggregate_methods {
    ($($prefix:ident, $direct:ident => $function:ident;)*) => {
        impl SelectQuery {
            $(
                #[doc = concat!("Queue `", stringify!($function), "` to wrap the next function call")]
                pub fn $prefix(mut self) -> Self {
                    self.fun_stack.push(Aggregate::$function);
                    self
                }

                #[doc = concat!("Select `", stringify!($function), "` over `columns` (`*` when empty)")]
                pub fn $direct<I, S>(self, columns: I, alias: Option<&str>) -> Self
                where
                    I: IntoIterator<Item = S>,
                    S: Into<String>,
                {
                    let args = columns.into_iter().map(|c| FunArg::Column(c.into())).collect();
                    self.fun(Aggregate::$function, args, alias)
                }
            )*
        }
    };
}

aggregate_methods! {
    abs, abs_of => Abs;
    ceil, ceil_of => Ceil;
    floor, floor_of => Floor;
    round, round_of => Round;
    avg, avg_of => Avg;
    min, min_of => Min;
    max, max_of => Max;
    log, log_of => Log;
    log2, log2_of => Log2;
    log10, log10_of => Log10;
    exp, exp_of => Exp;
    power, power_of => Power;
    acos, acos_of => Acos;
    asin, asin_of => Asin;
    atan, atan_of => Atan;
    cos, cos_of => Cos;
    sin, sin_of => Sin;
    tan, tan_of => Tan;
    conv, conv_of => Conv;
    random, random_of => Random;
    rand, rand_of => Rand;
    radians, radians_of => Radians;
    degrees, degrees_of => Degrees;
    sum, sum_of => Sum;
    count, count_of => Count;
    distinct, distinct_of => Distinct;
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::Timezone;
    use crate::sql::dialect::PostgresDialect;

    fn query() -> SelectQuery {
        SelectQuery::new(Arc::new(PostgresDialect), Timezone::Local)
    }

    #[test]
    fn test_prefix_functions_are_consumed_by_next_call() {
        let q = query().from("person").distinct().count_of(["id"], None);
        assert!(q.fun_stack.is_empty());
        assert_eq!(
            q.tables()[0].select[0],
            SelectItem::Function {
                function: Aggregate::Count,
                args: vec![FunArg::Column("id".into())],
                alias: None,
                wrappers: vec![Aggregate::Distinct],
            }
        );
    }

    #[test]
    fn test_as_alias_targets_last_item() {
        let q = query().from("person").select(["name", "age"]).as_alias("years");
        assert_eq!(
            q.tables()[0].select[1],
            SelectItem::Column {
                name: "age".into(),
                alias: Some("years".into())
            }
        );
    }

    #[test]
    fn test_transform_wraps_scalars() {
        let q = query().from("person").transform("fn", Some(JsonValue::from(3)));
        assert_eq!(q.transform.unwrap().args, Some(serde_json::json!([3])));

        let q = query().from("person").transform("fn", Some(serde_json::json!({"a": 1})));
        assert_eq!(q.transform.unwrap().args, Some(serde_json::json!({"a": 1})));
    }
}
