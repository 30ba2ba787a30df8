//! Routes: the executable description of one query handed over by the
//! planner. Routes are immutable and may be cached across requests; every
//! capability a route relies on is checked when it is built.

use std::fmt;
use std::sync::Arc;

use shardgate_common::error::{GateResult, PlanError};

use crate::bind_vars::ValueRef;
use crate::vindex::Vindex;

/// Placeholder in an insert query replaced by the row tuples of one shard.
pub const ROW_VALUES_PLACEHOLDER: &str = ":#rowvalues";

/// Prefix of the per-row bind variables carrying sequence values.
pub const SEQ_VAR_PREFIX: &str = "__seq";

/// Sharding strategy of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    SelectUnsharded,
    SelectEqualUnique,
    SelectEqual,
    SelectIN,
    SelectScatter,
    UpdateUnsharded,
    UpdateEqual,
    DeleteUnsharded,
    DeleteEqual,
    InsertUnsharded,
    InsertSharded,
}

impl Opcode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Opcode::SelectUnsharded => "SelectUnsharded",
            Opcode::SelectEqualUnique => "SelectEqualUnique",
            Opcode::SelectEqual => "SelectEqual",
            Opcode::SelectIN => "SelectIN",
            Opcode::SelectScatter => "SelectScatter",
            Opcode::UpdateUnsharded => "UpdateUnsharded",
            Opcode::UpdateEqual => "UpdateEqual",
            Opcode::DeleteUnsharded => "DeleteUnsharded",
            Opcode::DeleteEqual => "DeleteEqual",
            Opcode::InsertUnsharded => "InsertUnsharded",
            Opcode::InsertSharded => "InsertSharded",
        }
    }

    /// Only selects can be streamed.
    pub fn is_streamable(&self) -> bool {
        matches!(
            self,
            Opcode::SelectUnsharded
                | Opcode::SelectEqualUnique
                | Opcode::SelectEqual
                | Opcode::SelectIN
                | Opcode::SelectScatter
        )
    }

    /// Opcodes that route by mapping key values through a vindex.
    pub fn needs_vindex(&self) -> bool {
        matches!(
            self,
            Opcode::SelectEqualUnique
                | Opcode::SelectEqual
                | Opcode::SelectIN
                | Opcode::UpdateEqual
                | Opcode::DeleteEqual
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A vindex bound to a table column.
#[derive(Debug, Clone)]
pub struct ColumnVindex {
    pub column: String,
    pub vindex: Arc<dyn Vindex>,
    /// Lookup rows are created and deleted by the router.
    pub owned: bool,
}

impl ColumnVindex {
    pub fn new(column: impl Into<String>, vindex: Arc<dyn Vindex>, owned: bool) -> GateResult<Self> {
        if owned && vindex.as_lookup().is_none() {
            return Err(PlanError::MissingCapability {
                vindex: vindex.name().to_string(),
                capability: "lookup (required for an owned vindex)".into(),
            }
            .into());
        }
        Ok(Self {
            column: column.into(),
            vindex,
            owned,
        })
    }
}

/// A sharded table: its column vindexes, primary first.
#[derive(Debug, Clone)]
pub struct Table {
    pub name: String,
    pub column_vindexes: Vec<Arc<ColumnVindex>>,
}

impl Table {
    pub fn new(name: impl Into<String>, column_vindexes: Vec<ColumnVindex>) -> GateResult<Self> {
        let name = name.into();
        let primary = column_vindexes.first().ok_or_else(|| {
            PlanError::Malformed(format!("table {} has no column vindexes", name))
        })?;
        if primary.vindex.as_unique().is_none() {
            return Err(PlanError::MissingCapability {
                vindex: primary.vindex.name().to_string(),
                capability: "unique (required for a primary vindex)".into(),
            }
            .into());
        }
        if primary.owned {
            return Err(PlanError::Malformed(format!(
                "primary vindex {} of table {} cannot be owned",
                primary.vindex.name(),
                name
            ))
            .into());
        }
        Ok(Self {
            name,
            column_vindexes: column_vindexes.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn primary(&self) -> &ColumnVindex {
        // Non-empty by construction.
        &self.column_vindexes[0]
    }

    /// Owned column vindexes in declaration order.
    pub fn owned(&self) -> impl Iterator<Item = &ColumnVindex> {
        self.column_vindexes
            .iter()
            .map(|cv| cv.as_ref())
            .filter(|cv| cv.owned)
    }
}

/// Sequence generation for the auto-increment column of an insert.
#[derive(Debug, Clone)]
pub struct Generate {
    /// Unsharded keyspace holding the sequence.
    pub keyspace: String,
    /// Query returning the first of `n` reserved values.
    pub query: String,
    /// The auto-increment value of each row; null or unset means "generate".
    pub values: Vec<ValueRef>,
}

/// Key values of a route, shaped by its opcode.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RouteValues {
    #[default]
    None,
    /// One key (`Equal` opcodes).
    Single(ValueRef),
    /// A list of keys (`SelectIN`).
    List(ValueRef),
    /// Per insert row, the value of each column vindex in table order.
    Rows(Vec<Vec<ValueRef>>),
}

#[derive(Debug, Clone)]
pub struct Route {
    pub opcode: Opcode,
    pub keyspace: String,
    pub query: String,
    /// Query returning only field info, for `get_route_fields`.
    pub field_query: String,
    /// Pre-image query of a `DeleteEqual`: one column per owned vindex.
    pub subquery: String,
    pub vindex: Option<Arc<dyn Vindex>>,
    pub table: Option<Arc<Table>>,
    pub values: RouteValues,
    /// Full insert rows, rendered into [`ROW_VALUES_PLACEHOLDER`].
    pub rows: Vec<Vec<ValueRef>>,
    pub generate: Option<Generate>,
    /// Names of variables joins supply from outer routes.
    pub join_vars: Vec<String>,
}

impl Route {
    pub fn builder(opcode: Opcode, keyspace: impl Into<String>, query: impl Into<String>) -> RouteBuilder {
        RouteBuilder {
            route: Route {
                opcode,
                keyspace: keyspace.into(),
                query: query.into(),
                field_query: String::new(),
                subquery: String::new(),
                vindex: None,
                table: None,
                values: RouteValues::None,
                rows: Vec::new(),
                generate: None,
                join_vars: Vec::new(),
            },
        }
    }

    pub(crate) fn vindex(&self) -> GateResult<&Arc<dyn Vindex>> {
        self.vindex.as_ref().ok_or_else(|| {
            PlanError::Malformed(format!("{} route has no vindex", self.opcode)).into()
        })
    }

    pub(crate) fn table(&self) -> GateResult<&Arc<Table>> {
        self.table.as_ref().ok_or_else(|| {
            PlanError::Malformed(format!("{} route has no table", self.opcode)).into()
        })
    }
}

pub struct RouteBuilder {
    route: Route,
}

impl RouteBuilder {
    pub fn vindex(mut self, vindex: Arc<dyn Vindex>) -> Self {
        self.route.vindex = Some(vindex);
        self
    }

    pub fn table(mut self, table: Arc<Table>) -> Self {
        self.route.table = Some(table);
        self
    }

    pub fn values(mut self, values: RouteValues) -> Self {
        self.route.values = values;
        self
    }

    pub fn rows(mut self, rows: Vec<Vec<ValueRef>>) -> Self {
        self.route.rows = rows;
        self
    }

    pub fn generate(mut self, generate: Generate) -> Self {
        self.route.generate = Some(generate);
        self
    }

    pub fn field_query(mut self, q: impl Into<String>) -> Self {
        self.route.field_query = q.into();
        self
    }

    pub fn subquery(mut self, q: impl Into<String>) -> Self {
        self.route.subquery = q.into();
        self
    }

    pub fn join_vars(mut self, names: Vec<String>) -> Self {
        self.route.join_vars = names;
        self
    }

    /// Validate the route against its opcode's requirements.
    pub fn build(self) -> GateResult<Route> {
        let r = self.route;
        let malformed = |msg: String| -> GateResult<Route> { Err(PlanError::Malformed(msg).into()) };

        if r.opcode.needs_vindex() {
            let Some(vindex) = &r.vindex else {
                return malformed(format!("{} route needs a vindex", r.opcode));
            };
            let mappable = match r.opcode {
                Opcode::SelectEqual | Opcode::SelectIN => {
                    vindex.as_unique().is_some() || vindex.as_non_unique().is_some()
                }
                _ => vindex.as_unique().is_some(),
            };
            if !mappable {
                return Err(PlanError::MissingCapability {
                    vindex: vindex.name().to_string(),
                    capability: format!("the map required by {}", r.opcode),
                }
                .into());
            }
        }

        match (r.opcode, &r.values) {
            (Opcode::SelectIN, RouteValues::List(_)) => {}
            (Opcode::SelectIN, _) => return malformed("SelectIN needs a list of values".into()),
            (
                Opcode::SelectEqual
                | Opcode::SelectEqualUnique
                | Opcode::UpdateEqual
                | Opcode::DeleteEqual,
                RouteValues::Single(_),
            ) => {}
            (
                Opcode::SelectEqual
                | Opcode::SelectEqualUnique
                | Opcode::UpdateEqual
                | Opcode::DeleteEqual,
                _,
            ) => return malformed(format!("{} needs a single key value", r.opcode)),
            _ => {}
        }

        if r.opcode == Opcode::DeleteEqual && !r.subquery.is_empty() && r.table.is_none() {
            return malformed("DeleteEqual with a subquery needs its table".into());
        }

        if r.opcode == Opcode::InsertSharded {
            let Some(table) = &r.table else {
                return malformed("InsertSharded needs its table".into());
            };
            let RouteValues::Rows(rows) = &r.values else {
                return malformed("InsertSharded needs per-row vindex values".into());
            };
            if let Some((i, row)) = rows
                .iter()
                .enumerate()
                .find(|(_, row)| row.len() != table.column_vindexes.len())
            {
                return malformed(format!(
                    "insert row {} has {} vindex values, table {} has {} column vindexes",
                    i,
                    row.len(),
                    table.name,
                    table.column_vindexes.len()
                ));
            }
            if rows.len() != r.rows.len() {
                return malformed(format!(
                    "{} vindex value rows for {} insert rows",
                    rows.len(),
                    r.rows.len()
                ));
            }
            if !r.query.contains(ROW_VALUES_PLACEHOLDER) {
                return malformed(format!(
                    "sharded insert query lacks {}",
                    ROW_VALUES_PLACEHOLDER
                ));
            }
        }

        if let Some(generate) = &r.generate {
            if !matches!(r.opcode, Opcode::InsertSharded | Opcode::InsertUnsharded) {
                return malformed(format!("{} route cannot generate sequence values", r.opcode));
            }
            if r.opcode == Opcode::InsertSharded && generate.values.len() != r.rows.len() {
                return malformed(format!(
                    "{} sequence values for {} insert rows",
                    generate.values.len(),
                    r.rows.len()
                ));
            }
        }

        Ok(r)
    }
}
