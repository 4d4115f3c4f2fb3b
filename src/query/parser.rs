use super::{AggregateFunction, Column, Query};
use crate::error::{AqeError, AqeResult};
use sqlparser::ast::{
    Expr, Function, FunctionArg, FunctionArgExpr, GroupByExpr, Select, SelectItem, SetExpr,
    Statement, TableFactor,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

/// Parse SQL text into a single AST statement
pub fn parse_sql(query: &str) -> AqeResult<Statement> {
    let dialect = GenericDialect {};
    let mut statements = Parser::parse_sql(&dialect, query).map_err(|e| {
        AqeError::unsupported_query(format!("Failed to parse SQL query: {}", e), query)
    })?;

    match statements.len() {
        1 => Ok(statements.remove(0)),
        0 => Err(AqeError::unsupported_query("Empty query", query)),
        n => Err(AqeError::unsupported_query(
            format!("Expected a single statement, found {}", n),
            query,
        )),
    }
}

/// Parse an aggregate query of the form
/// `SELECT [group_col,] AGG(col|*) FROM table [GROUP BY group_col]`
pub fn parse_query(text: &str) -> AqeResult<Query> {
    let statement = parse_sql(text)?;
    extract_query(&statement).map_err(|e| e.with_query(text))
}

fn extract_query(statement: &Statement) -> AqeResult<Query> {
    let query = match statement {
        Statement::Query(query) => query,
        _ => return Err(AqeError::unsupported("Only SELECT statements are supported")),
    };

    let select = match &*query.body {
        SetExpr::Select(select) => select,
        _ => return Err(AqeError::unsupported("Set operations and subqueries are not supported")),
    };

    if select.selection.is_some() {
        return Err(AqeError::unsupported("WHERE predicates are not supported"));
    }
    if select.having.is_some() {
        return Err(AqeError::unsupported("HAVING is not supported"));
    }

    let table = extract_table(select)?;
    let group_by = extract_group_by(select)?;
    let (function, column) = extract_aggregate(select, group_by)?;

    Ok(Query {
        function,
        column,
        table,
        group_by,
        embedded_approx: false,
    })
}

fn extract_table(select: &Select) -> AqeResult<String> {
    if select.from.len() != 1 || !select.from[0].joins.is_empty() {
        return Err(AqeError::unsupported("Exactly one table without joins is required"));
    }

    match &select.from[0].relation {
        TableFactor::Table { name, .. } => name
            .0
            .last()
            .map(|ident| ident.value.clone())
            .ok_or_else(|| AqeError::unsupported("Missing table name")),
        _ => Err(AqeError::unsupported("FROM must name a base table")),
    }
}

fn extract_group_by(select: &Select) -> AqeResult<Option<Column>> {
    match &select.group_by {
        GroupByExpr::All => Err(AqeError::unsupported("GROUP BY ALL is not supported")),
        GroupByExpr::Expressions(exprs) => match exprs.as_slice() {
            [] => Ok(None),
            [expr] => column_from_expr(expr).map(Some),
            _ => Err(AqeError::unsupported("GROUP BY supports a single column")),
        },
    }
}

fn extract_aggregate(
    select: &Select,
    group_by: Option<Column>,
) -> AqeResult<(AggregateFunction, Option<Column>)> {
    let mut aggregate = None;

    for item in &select.projection {
        let expr = match item {
            SelectItem::UnnamedExpr(expr) | SelectItem::ExprWithAlias { expr, .. } => expr,
            _ => return Err(AqeError::unsupported("Wildcard projections are not supported")),
        };

        match expr {
            Expr::Function(func) => {
                if aggregate.is_some() {
                    return Err(AqeError::unsupported("Only one aggregate per query is supported"));
                }
                aggregate = Some(extract_function(func)?);
            }
            // Plain columns are only allowed as the grouping key
            other => {
                let column = column_from_expr(other)?;
                if Some(column) != group_by {
                    return Err(AqeError::unsupported(format!(
                        "Column '{}' must appear in GROUP BY",
                        column
                    )));
                }
            }
        }
    }

    aggregate.ok_or_else(|| AqeError::unsupported("No aggregate function (SUM, COUNT, AVG) found"))
}

fn extract_function(func: &Function) -> AqeResult<(AggregateFunction, Option<Column>)> {
    let name = func.name.to_string();
    let function = AggregateFunction::from_name(&name).ok_or_else(|| {
        AqeError::unsupported(format!(
            "Unsupported aggregation function: {}. Supported functions: SUM, COUNT, AVG",
            name
        ))
    })?;

    if func.distinct {
        return Err(AqeError::unsupported("DISTINCT aggregates are not supported"));
    }
    if func.over.is_some() {
        return Err(AqeError::unsupported("Window functions are not supported"));
    }

    let arg = match func.args.as_slice() {
        [arg] => arg,
        _ => {
            return Err(AqeError::unsupported(format!(
                "{} expects exactly one argument",
                function
            )))
        }
    };

    let arg_expr = match arg {
        FunctionArg::Unnamed(arg_expr) | FunctionArg::Named { arg: arg_expr, .. } => arg_expr,
    };

    match (function, arg_expr) {
        (AggregateFunction::Count, FunctionArgExpr::Wildcard) => Ok((function, None)),
        // COUNT(1) counts rows just like COUNT(*)
        (AggregateFunction::Count, FunctionArgExpr::Expr(Expr::Value(_))) => Ok((function, None)),
        (_, FunctionArgExpr::Expr(expr)) => Ok((function, Some(column_from_expr(expr)?))),
        _ => Err(AqeError::unsupported(format!(
            "{} requires a column argument",
            function
        ))),
    }
}

fn column_from_expr(expr: &Expr) -> AqeResult<Column> {
    let name = match expr {
        Expr::Identifier(ident) => ident.value.as_str(),
        Expr::CompoundIdentifier(idents) => idents
            .last()
            .map(|ident| ident.value.as_str())
            .ok_or_else(|| AqeError::unsupported("Empty column reference"))?,
        Expr::Nested(inner) => return column_from_expr(inner),
        other => {
            return Err(AqeError::unsupported(format!(
                "Expected a column reference, found '{}'",
                other
            )))
        }
    };

    Column::from_name(name)
        .ok_or_else(|| AqeError::unsupported(format!("Unknown numeric column '{}'", name)))
}
