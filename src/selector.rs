use crate::error::{QueryError, Result};
use crate::schema::ID_FIELD;
use serde_json::{Map, Value};

/// Default bound on combinator and `$not` nesting
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Field name used in errors raised above the field level
const ROOT: &str = "<root>";

/// A test applied to one field
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
    /// Array containment (`$all`): every listed element is present
    Contains(Value),
    Size(u64),
    Regex {
        pattern: String,
        case_insensitive: bool,
    },
    Not(Box<Predicate>),
    /// Several operators on the same field, e.g. `{$gte: 1, $lt: 5}`
    Conjunction(Vec<Predicate>),
}

/// MongoDB-style selector tree
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    /// Field predicates, implicitly AND-ed, in key order
    Leaf(Vec<(String, Predicate)>),
    And(Vec<Selector>),
    Or(Vec<Selector>),
    Nor(Vec<Selector>),
}

impl Selector {
    /// The selector that matches every row
    pub fn empty() -> Self {
        Selector::Leaf(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Selector::Leaf(fields) if fields.is_empty())
    }

    /// Whether the selector is true for every row by its structure alone,
    /// e.g. `{}`, `{$and: [{}]}` or `{$or: [{}, {a: 1}]}`
    pub fn matches_everything(&self) -> bool {
        match self {
            Selector::Leaf(fields) => fields.is_empty(),
            Selector::And(children) => children.iter().all(Selector::matches_everything),
            Selector::Or(children) => children.iter().any(Selector::matches_everything),
            Selector::Nor(children) => children.is_empty(),
        }
    }

    pub fn by_id(id: impl Into<String>) -> Self {
        Self::eq(ID_FIELD, Value::String(id.into()))
    }

    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        Self::field(field, Predicate::Eq(value))
    }

    pub fn field(field: impl Into<String>, predicate: Predicate) -> Self {
        Selector::Leaf(vec![(field.into(), predicate)])
    }

    pub fn and(children: Vec<Selector>) -> Self {
        Selector::And(children)
    }

    pub fn or(children: Vec<Selector>) -> Self {
        Selector::Or(children)
    }

    pub fn nor(children: Vec<Selector>) -> Self {
        Selector::Nor(children)
    }

    /// Add a field predicate, AND-ed with what is already there
    pub fn with(self, field: impl Into<String>, predicate: Predicate) -> Self {
        match self {
            Selector::Leaf(mut fields) => {
                fields.push((field.into(), predicate));
                Selector::Leaf(fields)
            }
            other => Selector::And(vec![other, Selector::field(field, predicate)]),
        }
    }

    /// AND two selectors, concatenating field lists when both are leaves
    pub fn and_with(self, other: Selector) -> Self {
        match (self, other) {
            (Selector::Leaf(mut fields), Selector::Leaf(more)) => {
                fields.extend(more);
                Selector::Leaf(fields)
            }
            (left, right) if left.is_empty() => right,
            (left, right) if right.is_empty() => left,
            (Selector::And(mut children), right) => {
                children.push(right);
                Selector::And(children)
            }
            (left, right) => Selector::And(vec![left, right]),
        }
    }

    /// Parse a selector document with the default depth bound.
    ///
    /// A bare string is shorthand for `{_id: <string>}` and `null` is the
    /// empty selector.
    pub fn from_value(value: &Value) -> Result<Self> {
        Self::parse(value, DEFAULT_MAX_DEPTH)
    }

    pub fn parse(value: &Value, max_depth: usize) -> Result<Self> {
        Parser { max_depth }.selector(value, 0)
    }
}

impl TryFrom<&Value> for Selector {
    type Error = QueryError;

    fn try_from(value: &Value) -> Result<Self> {
        Selector::from_value(value)
    }
}

struct Parser {
    max_depth: usize,
}

impl Parser {
    fn selector(&self, value: &Value, depth: usize) -> Result<Selector> {
        if depth > self.max_depth {
            return Err(QueryError::SelectorTooDeep(self.max_depth));
        }

        match value {
            Value::Null => Ok(Selector::empty()),
            Value::String(id) => Ok(Selector::by_id(id.clone())),
            Value::Object(map) => self.object(map, depth),
            other => Err(QueryError::TypeMismatch(format!(
                "selector must be an object or an id string, got {}",
                other
            ))),
        }
    }

    fn object(&self, map: &Map<String, Value>, depth: usize) -> Result<Selector> {
        let mut pieces = Vec::with_capacity(map.len());

        for (key, value) in map {
            let piece = match key.as_str() {
                "$and" => Selector::And(self.children(key, value, depth)?),
                "$or" => Selector::Or(self.children(key, value, depth)?),
                "$nor" => Selector::Nor(self.children(key, value, depth)?),
                op if op.starts_with('$') => return Err(QueryError::unsupported(op, ROOT)),
                field => Selector::field(field, self.predicate(field, value, depth)?),
            };
            pieces.push(piece);
        }

        if pieces.iter().all(|p| matches!(p, Selector::Leaf(_))) {
            let fields = pieces
                .into_iter()
                .flat_map(|p| match p {
                    Selector::Leaf(fields) => fields,
                    _ => Vec::new(),
                })
                .collect();
            return Ok(Selector::Leaf(fields));
        }

        if pieces.len() == 1 {
            return Ok(pieces.remove(0));
        }

        Ok(Selector::And(pieces))
    }

    fn children(&self, op: &str, value: &Value, depth: usize) -> Result<Vec<Selector>> {
        let items = match value {
            Value::Array(items) if !items.is_empty() => items,
            _ => {
                return Err(QueryError::TypeMismatch(format!(
                    "{} needs a non-empty array of selectors",
                    op
                )))
            }
        };

        items
            .iter()
            .map(|item| match item {
                Value::Object(_) => self.selector(item, depth + 1),
                other => Err(QueryError::TypeMismatch(format!(
                    "{} entries must be selector objects, got {}",
                    op, other
                ))),
            })
            .collect()
    }

    fn predicate(&self, field: &str, value: &Value, depth: usize) -> Result<Predicate> {
        match value {
            Value::Object(map) if map.keys().any(|k| k.starts_with('$')) => {
                if !map.keys().all(|k| k.starts_with('$')) {
                    return Err(QueryError::TypeMismatch(format!(
                        "field \"{}\" mixes operators with plain keys",
                        field
                    )));
                }
                self.operators(field, map, depth)
            }
            other => Ok(Predicate::Eq(other.clone())),
        }
    }

    fn operators(&self, field: &str, map: &Map<String, Value>, depth: usize) -> Result<Predicate> {
        if map.contains_key("$options") && !map.contains_key("$regex") {
            return Err(QueryError::TypeMismatch(format!(
                "$options without $regex on field \"{}\"",
                field
            )));
        }

        let mut predicates = Vec::with_capacity(map.len());

        for (op, arg) in map {
            let predicate = match op.as_str() {
                "$eq" => Predicate::Eq(arg.clone()),
                "$ne" => Predicate::Ne(arg.clone()),
                "$gt" => Predicate::Gt(comparable(op, field, arg)?),
                "$gte" => Predicate::Gte(comparable(op, field, arg)?),
                "$lt" => Predicate::Lt(comparable(op, field, arg)?),
                "$lte" => Predicate::Lte(comparable(op, field, arg)?),
                "$in" => Predicate::In(array(op, field, arg)?),
                "$nin" => Predicate::Nin(array(op, field, arg)?),
                "$all" => Predicate::Contains(Value::Array(array(op, field, arg)?)),
                "$exists" => match arg {
                    Value::Bool(exists) => Predicate::Exists(*exists),
                    other => return Err(mismatch(op, field, "a boolean", other)),
                },
                "$size" => match arg.as_u64() {
                    Some(size) => Predicate::Size(size),
                    None => return Err(mismatch(op, field, "a non-negative integer", arg)),
                },
                "$regex" => regex(field, arg, map.get("$options"))?,
                "$options" => continue,
                "$not" => {
                    if depth + 1 > self.max_depth {
                        return Err(QueryError::SelectorTooDeep(self.max_depth));
                    }
                    match arg {
                        Value::Object(inner)
                            if !inner.is_empty() && inner.keys().all(|k| k.starts_with('$')) =>
                        {
                            Predicate::Not(Box::new(self.operators(field, inner, depth + 1)?))
                        }
                        other => return Err(mismatch(op, field, "an operator object", other)),
                    }
                }
                other => return Err(QueryError::unsupported(other, field)),
            };
            predicates.push(predicate);
        }

        if predicates.len() == 1 {
            Ok(predicates.remove(0))
        } else {
            Ok(Predicate::Conjunction(predicates))
        }
    }
}

fn mismatch(op: &str, field: &str, expected: &str, got: &Value) -> QueryError {
    QueryError::TypeMismatch(format!(
        "{} on field \"{}\" expects {}, got {}",
        op, field, expected, got
    ))
}

fn comparable(op: &str, field: &str, arg: &Value) -> Result<Value> {
    if arg.is_null() {
        return Err(mismatch(op, field, "a non-null value", arg));
    }
    Ok(arg.clone())
}

fn array(op: &str, field: &str, arg: &Value) -> Result<Vec<Value>> {
    match arg {
        Value::Array(items) => Ok(items.clone()),
        other => Err(mismatch(op, field, "an array", other)),
    }
}

fn regex(field: &str, pattern: &Value, options: Option<&Value>) -> Result<Predicate> {
    let pattern = match pattern {
        Value::String(pattern) => pattern.clone(),
        other => return Err(mismatch("$regex", field, "a string", other)),
    };

    let case_insensitive = match options {
        None => false,
        Some(Value::String(flags)) if flags.is_empty() => false,
        Some(Value::String(flags)) if flags == "i" => true,
        Some(other) => return Err(mismatch("$options", field, "\"\" or \"i\"", other)),
    };

    Ok(Predicate::Regex {
        pattern,
        case_insensitive,
    })
}
