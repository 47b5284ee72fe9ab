//! Catalog queries.
//!
//! Three query flavours share one connection:
//!
//! - [`GenQuery`], the legacy general query. Results arrive in pages of
//!   column-major data, linked by a continuation handle.
//! - [`SpecificQuery`], a named query registered on the server, paged the
//!   same way as the general query.
//! - GenQuery2, a textual query language answered in a single JSON reply.
//!
//! Paged queries push rows to a callback. Returning `false` from the
//! callback stops the query before the next page is requested.

use crate::connection::Connection;
use crate::error::ClientError;
use crate::transport::Transport;
use irods_protocol::api::{keyword, GENQUERY2_AN, GEN_QUERY_AN, SPECIFIC_QUERY_AN};
use irods_protocol::message::{
    GenQueryInp, GenQueryOut, Genquery2Input, InxIvalPair, InxValPair, KeyValPair,
    SpecificQueryInp, StrPi, MAX_SPECIFIC_QUERY_ARGS,
};
use irods_protocol::{ErrorCode, PackingInstruction};
use std::collections::{BTreeMap, HashSet};
use std::ops::BitOr;

/// Maximum columns a general query may select.
pub const MAX_SELECTED_COLUMNS: usize = 64;

/// Largest page a query may request.
pub const MAX_ROWS_PER_PAGE: i32 = 256;

/// Option flags of a general query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueryOptions(i32);

impl QueryOptions {
    /// Ask the server to report the total number of matching rows.
    pub const RETURN_TOTAL_ROW_COUNT: QueryOptions = QueryOptions(0x20);
    pub const NO_DISTINCT: QueryOptions = QueryOptions(0x40);
    pub const QUOTA_QUERY: QueryOptions = QueryOptions(0x80);
    /// Release the server-side cursor after the last page.
    pub const AUTO_CLOSE: QueryOptions = QueryOptions(0x100);
    pub const UPPER_CASE_WHERE: QueryOptions = QueryOptions(0x200);

    pub const fn empty() -> Self {
        QueryOptions(0)
    }

    pub const fn bits(&self) -> i32 {
        self.0
    }

    pub const fn contains(&self, other: QueryOptions) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for QueryOptions {
    type Output = QueryOptions;

    fn bitor(self, rhs: QueryOptions) -> QueryOptions {
        QueryOptions(self.0 | rhs.0)
    }
}

/// How a selected column is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColumnModifier {
    #[default]
    Plain,
    OrderBy,
    OrderByDesc,
    Min,
    Max,
    Sum,
    Avg,
    Count,
}

impl ColumnModifier {
    /// Value sent alongside the column id.
    pub fn flag(&self) -> i32 {
        match self {
            ColumnModifier::Plain => 1,
            ColumnModifier::Min => 2,
            ColumnModifier::Max => 3,
            ColumnModifier::Sum => 4,
            ColumnModifier::Avg => 5,
            ColumnModifier::Count => 6,
            ColumnModifier::OrderBy => 0x400,
            ColumnModifier::OrderByDesc => 0x800,
        }
    }
}

/// Outcome of a paged query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QuerySummary {
    /// Rows handed to the callback.
    pub rows: u64,
    /// Pages fetched from the server.
    pub pages: u32,
    /// Total matching rows, when requested with
    /// [`QueryOptions::RETURN_TOTAL_ROW_COUNT`].
    pub total_row_count: Option<i32>,
}

/// A legacy general query.
///
/// ```ignore
/// let query = GenQuery::new()
///     .select(COL_COLL_NAME)
///     .order_by(COL_DATA_NAME)
///     .condition(COL_COLL_NAME, "like '/tempZone/home/%'");
/// query.execute(&mut conn, |row| {
///     println!("{}/{}", row[0], row[1]);
///     true
/// }).await?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenQuery {
    select: Vec<(i32, ColumnModifier)>,
    conditions: Vec<(i32, String)>,
    rows_per_page: i32,
    options: QueryOptions,
    zone: Option<String>,
}

impl Default for GenQuery {
    fn default() -> Self {
        Self::new()
    }
}

impl GenQuery {
    pub fn new() -> Self {
        Self {
            select: Vec::new(),
            conditions: Vec::new(),
            rows_per_page: MAX_ROWS_PER_PAGE,
            options: QueryOptions::empty(),
            zone: None,
        }
    }

    pub fn select(self, column: i32) -> Self {
        self.select_with(column, ColumnModifier::Plain)
    }

    pub fn select_with(mut self, column: i32, modifier: ColumnModifier) -> Self {
        self.select.push((column, modifier));
        self
    }

    pub fn order_by(self, column: i32) -> Self {
        self.select_with(column, ColumnModifier::OrderBy)
    }

    pub fn order_by_desc(self, column: i32) -> Self {
        self.select_with(column, ColumnModifier::OrderByDesc)
    }

    /// Adds a condition such as `= 'x'` or `like '/tempZone/%'` on `column`.
    pub fn condition(mut self, column: i32, condition: impl Into<String>) -> Self {
        self.conditions.push((column, condition.into()));
        self
    }

    pub fn rows_per_page(mut self, rows: i32) -> Self {
        self.rows_per_page = rows;
        self
    }

    pub fn options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    /// Runs the query against another zone.
    pub fn zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = Some(zone.into());
        self
    }

    pub fn selected_columns(&self) -> Vec<i32> {
        self.select.iter().map(|(column, _)| *column).collect()
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        if self.select.is_empty() {
            return Err(ClientError::Validation("no columns selected".into()));
        }
        if self.select.len() > MAX_SELECTED_COLUMNS {
            return Err(ClientError::Validation(format!(
                "{} columns selected, at most {MAX_SELECTED_COLUMNS} allowed",
                self.select.len()
            )));
        }
        let mut seen = HashSet::new();
        for (column, _) in &self.select {
            if !seen.insert(*column) {
                return Err(ClientError::Validation(format!(
                    "column {column} selected more than once"
                )));
            }
        }
        if !(1..=MAX_ROWS_PER_PAGE).contains(&self.rows_per_page) {
            return Err(ClientError::Validation(format!(
                "rows per page must be between 1 and {MAX_ROWS_PER_PAGE}, got {}",
                self.rows_per_page
            )));
        }
        validate_zone(self.zone.as_deref())
    }

    /// First-page request for this query.
    pub fn to_input(&self) -> GenQueryInp {
        GenQueryInp {
            max_rows: self.rows_per_page,
            continue_inx: 0,
            partial_start_index: 0,
            options: self.options.bits(),
            cond_input: zone_keyword(self.zone.as_deref()),
            select: InxIvalPair {
                pairs: self
                    .select
                    .iter()
                    .map(|(column, modifier)| (*column, modifier.flag()))
                    .collect(),
            },
            conditions: InxValPair {
                pairs: self.conditions.clone(),
            },
        }
    }

    /// Runs the query, passing each row to `on_row` in selection order.
    pub async fn execute<T, F>(&self, conn: &mut Connection<T>, on_row: F) -> Result<QuerySummary, ClientError>
    where
        T: Transport,
        F: FnMut(&[String]) -> bool,
    {
        self.validate()?;
        let pages = Pages {
            api_number: GEN_QUERY_AN,
            projection: self.selected_columns(),
            want_total: self.options.contains(QueryOptions::RETURN_TOTAL_ROW_COUNT),
        };
        pages.run(conn, self.to_input(), on_row).await
    }

    /// Runs the query and collects every row.
    pub async fn collect<T: Transport>(&self, conn: &mut Connection<T>) -> Result<Vec<Vec<String>>, ClientError> {
        let mut rows = Vec::new();
        self.execute(conn, |row| {
            rows.push(row.to_vec());
            true
        })
        .await?;
        Ok(rows)
    }
}

/// A named query registered on the server.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpecificQuery {
    name: String,
    args: Vec<String>,
    zone: Option<String>,
}

impl SpecificQuery {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Appends a bind argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = Some(zone.into());
        self
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        if self.name.trim().is_empty() {
            return Err(ClientError::Validation("query name is empty".into()));
        }
        if self.args.len() > MAX_SPECIFIC_QUERY_ARGS {
            return Err(ClientError::Validation(format!(
                "{} bind arguments given, at most {MAX_SPECIFIC_QUERY_ARGS} allowed",
                self.args.len()
            )));
        }
        validate_zone(self.zone.as_deref())
    }

    pub fn to_input(&self) -> Result<SpecificQueryInp, ClientError> {
        self.validate()?;
        let mut input = SpecificQueryInp::new(self.name.as_str(), self.args.clone())
            .map_err(|e| ClientError::Validation(e.to_string()))?;
        input.max_rows = MAX_ROWS_PER_PAGE;
        input.cond_input = zone_keyword(self.zone.as_deref());
        Ok(input)
    }

    /// Runs the query, passing each row to `on_row` in the order the
    /// server returns columns.
    pub async fn execute<T, F>(&self, conn: &mut Connection<T>, on_row: F) -> Result<QuerySummary, ClientError>
    where
        T: Transport,
        F: FnMut(&[String]) -> bool,
    {
        let input = self.to_input()?;
        let pages = Pages {
            api_number: SPECIFIC_QUERY_AN,
            projection: Vec::new(),
            want_total: false,
        };
        pages.run(conn, input, on_row).await
    }

    pub async fn collect<T: Transport>(&self, conn: &mut Connection<T>) -> Result<Vec<Vec<String>>, ClientError> {
        let mut rows = Vec::new();
        self.execute(conn, |row| {
            rows.push(row.to_vec());
            true
        })
        .await?;
        Ok(rows)
    }
}

fn validate_zone(zone: Option<&str>) -> Result<(), ClientError> {
    match zone {
        Some(zone) if zone.trim().is_empty() => Err(ClientError::Validation("zone is empty".into())),
        _ => Ok(()),
    }
}

fn zone_keyword(zone: Option<&str>) -> KeyValPair {
    let mut options = KeyValPair::new();
    if let Some(zone) = zone {
        options.insert(keyword::ZONE, zone);
    }
    options
}

/// A request that can be re-sent for the following page.
trait PagedRequest: PackingInstruction {
    fn continue_from(&mut self, handle: i32);
}

impl PagedRequest for GenQueryInp {
    fn continue_from(&mut self, handle: i32) {
        self.continue_inx = handle;
    }
}

impl PagedRequest for SpecificQueryInp {
    fn continue_from(&mut self, handle: i32) {
        self.continue_inx = handle;
    }
}

/// Pagination loop shared by the paged query flavours.
struct Pages {
    api_number: i32,
    /// Column ids in the order rows are delivered; empty for server order.
    projection: Vec<i32>,
    want_total: bool,
}

impl Pages {
    async fn run<T, R, F>(&self, conn: &mut Connection<T>, mut request: R, mut on_row: F) -> Result<QuerySummary, ClientError>
    where
        T: Transport,
        R: PagedRequest,
        F: FnMut(&[String]) -> bool,
    {
        let mut summary = QuerySummary::default();

        loop {
            let reply = conn.exchange(self.api_number, &request).await?;
            if reply.status == ErrorCode::CAT_NO_ROWS_FOUND.0 {
                tracing::debug!("API {}: no more rows", self.api_number);
                break;
            }
            let reply = reply.into_result()?;
            let Some(page) = reply.decode::<GenQueryOut>(conn.codec())? else {
                break;
            };
            page.validate()?;
            summary.pages += 1;
            if self.want_total {
                summary.total_row_count = Some(page.total_row_count);
            }

            let order = self.column_order(&page);
            let mut row = Vec::with_capacity(order.len());
            for r in 0..page.row_cnt as usize {
                row.clear();
                row.extend(order.iter().map(|&c| page.columns[c].values[r].clone()));
                summary.rows += 1;
                if !on_row(&row) {
                    return Ok(summary);
                }
            }

            if page.continue_inx <= 0 {
                break;
            }
            request.continue_from(page.continue_inx);
        }

        Ok(summary)
    }

    /// Maps delivered positions to columns of `page`.
    ///
    /// Columns are matched to the projection by attribute index; when the
    /// page's indices do not cover the projection, server order is used.
    fn column_order(&self, page: &GenQueryOut) -> Vec<usize> {
        let positional = || (0..page.attri_cnt()).collect();
        if self.projection.is_empty() {
            return positional();
        }

        let matched: Option<Vec<usize>> = self
            .projection
            .iter()
            .map(|id| page.columns.iter().position(|c| c.attri_inx == *id))
            .collect();
        match matched {
            Some(order) => order,
            None => {
                if page.attri_cnt() != self.projection.len() {
                    tracing::warn!(
                        "Reply carries {} columns for {} selected",
                        page.attri_cnt(),
                        self.projection.len()
                    );
                }
                positional()
            }
        }
    }
}

/// Runs a GenQuery2 query and returns its rows.
pub async fn genquery2<T: Transport>(
    conn: &mut Connection<T>,
    query: &str,
    zone: Option<&str>,
) -> Result<Vec<Vec<String>>, ClientError> {
    let input = genquery2_input(query, zone)?;
    let json = genquery2_call(conn, &input).await?;
    Ok(serde_json::from_str(&json)?)
}

/// Returns the SQL the server would run for a GenQuery2 query.
pub async fn genquery2_sql<T: Transport>(
    conn: &mut Connection<T>,
    query: &str,
    zone: Option<&str>,
) -> Result<String, ClientError> {
    let input = Genquery2Input {
        sql_only: true,
        ..genquery2_input(query, zone)?
    };
    genquery2_call(conn, &input).await
}

/// Returns the GenQuery2 column names, grouped by table, with the
/// database column each maps to.
pub async fn genquery2_column_mappings<T: Transport>(
    conn: &mut Connection<T>,
) -> Result<BTreeMap<String, BTreeMap<String, String>>, ClientError> {
    let input = Genquery2Input {
        column_mappings: true,
        ..Default::default()
    };
    let json = genquery2_call(conn, &input).await?;
    Ok(serde_json::from_str(&json)?)
}

fn genquery2_input(query: &str, zone: Option<&str>) -> Result<Genquery2Input, ClientError> {
    if query.trim().is_empty() {
        return Err(ClientError::Validation("query string is empty".into()));
    }
    validate_zone(zone)?;
    Ok(Genquery2Input {
        query_string: query.to_string(),
        zone: zone.map(str::to_string),
        ..Default::default()
    })
}

async fn genquery2_call<T: Transport>(conn: &mut Connection<T>, input: &Genquery2Input) -> Result<String, ClientError> {
    let out: StrPi = conn.call(GENQUERY2_AN, input).await?;
    Ok(out.my_str)
}
