use crate::compaction::CompactionMode;
use crate::error::RowStoreError;
use crate::mutation::{BatchOperation, BatchResult, DeleteOutcome, FieldAppend, RowTarget, UpdateOutcome};
use crate::store::{RowStore, ServiceStatus};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

pub struct AppState {
    pub store: Arc<RowStore>,
}

impl AppState {
    pub fn new(store: RowStore) -> Self {
        AppState {
            store: Arc::new(store),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandError {
    pub message: String,
    pub kind: String,
    pub status: u16,
}

impl From<RowStoreError> for CommandError {
    fn from(e: RowStoreError) -> Self {
        CommandError {
            message: e.to_string(),
            kind: e.kind().to_string(),
            status: e.status_code(),
        }
    }
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.status, self.kind, self.message)
    }
}

fn default_sheet() -> String {
    "Sheet1".to_string()
}

fn default_column_start() -> u32 {
    1
}

fn default_process_all() -> bool {
    true
}

// ==================== Requests ====================

#[derive(Debug, Clone, Deserialize)]
pub struct SheetsRequest {
    pub file: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppendRequest {
    pub file: String,
    #[serde(default = "default_sheet")]
    pub sheet: String,
    pub values: Vec<Value>,
    #[serde(default = "default_column_start")]
    pub column_start: u32,
}

/// Append addressed by header name
#[derive(Debug, Clone, Deserialize)]
pub struct AppendObjectRequest {
    pub file: String,
    #[serde(default = "default_sheet")]
    pub sheet: String,
    pub values: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReadRequest {
    pub file: String,
    #[serde(default = "default_sheet")]
    pub sheet: String,
    #[serde(default)]
    pub range: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateRequest {
    pub file: String,
    #[serde(default = "default_sheet")]
    pub sheet: String,
    pub row: u32,
    pub values: Vec<Value>,
    #[serde(default = "default_column_start")]
    pub column_start: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteRequest {
    pub file: String,
    #[serde(default = "default_sheet")]
    pub sheet: String,
    pub row: u32,
}

/// Field update by row number or by lookup
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateAdvancedRequest {
    pub file: String,
    #[serde(default = "default_sheet")]
    pub sheet: String,
    #[serde(default)]
    pub row: Option<u32>,
    #[serde(default)]
    pub lookup_column: Option<String>,
    #[serde(default)]
    pub lookup_value: Option<Value>,
    pub values_to_set: Map<String, Value>,
    #[serde(default = "default_process_all")]
    pub process_all: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteAdvancedRequest {
    pub file: String,
    #[serde(default = "default_sheet")]
    pub sheet: String,
    #[serde(default)]
    pub row: Option<u32>,
    #[serde(default)]
    pub lookup_column: Option<String>,
    #[serde(default)]
    pub lookup_value: Option<Value>,
    #[serde(default = "default_process_all")]
    pub process_all: bool,
}

impl UpdateAdvancedRequest {
    fn target(&self) -> Result<RowTarget, RowStoreError> {
        RowTarget::from_parts(
            self.row,
            self.lookup_column.as_deref(),
            self.lookup_value.as_ref(),
            self.process_all,
        )
    }
}

impl DeleteAdvancedRequest {
    fn target(&self) -> Result<RowTarget, RowStoreError> {
        RowTarget::from_parts(
            self.row,
            self.lookup_column.as_deref(),
            self.lookup_value.as_ref(),
            self.process_all,
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchRequest {
    pub file: String,
    #[serde(default = "default_sheet")]
    pub sheet: String,
    pub operations: Vec<BatchOperation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompactRequest {
    pub file: String,
    #[serde(default = "default_sheet")]
    pub sheet: String,
    #[serde(default)]
    pub mode: CompactionMode,
}

/// Any request, tagged by `op`
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Status,
    Files,
    Sheets(SheetsRequest),
    Append(AppendRequest),
    AppendObject(AppendObjectRequest),
    Read(ReadRequest),
    Update(UpdateRequest),
    Delete(DeleteRequest),
    UpdateAdvanced(UpdateAdvancedRequest),
    DeleteAdvanced(DeleteAdvancedRequest),
    Batch(BatchRequest),
    Compact(CompactRequest),
}

// ==================== Responses ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesResponse {
    pub success: bool,
    pub files: Vec<String>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetsResponse {
    pub success: bool,
    pub sheets: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendResponse {
    pub success: bool,
    pub row_number: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendObjectResponse {
    pub success: bool,
    #[serde(flatten)]
    pub outcome: FieldAppend,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResponse {
    pub success: bool,
    pub data: Vec<Vec<Value>>,
    pub row_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateAdvancedResponse {
    pub success: bool,
    pub message: String,
    #[serde(flatten)]
    pub outcome: UpdateOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteAdvancedResponse {
    pub success: bool,
    pub message: String,
    #[serde(flatten)]
    pub outcome: DeleteOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResponse {
    pub success: bool,
    pub results: Vec<BatchResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactResponse {
    pub success: bool,
    pub removed: u32,
}

/// Run a blocking store call off the async runtime
async fn run_blocking<T, F>(state: &AppState, f: F) -> Result<T, CommandError>
where
    T: Send + 'static,
    F: FnOnce(&RowStore) -> Result<T, RowStoreError> + Send + 'static,
{
    let store = Arc::clone(&state.store);
    let result = tokio::task::spawn_blocking(move || f(&store))
        .await
        .map_err(|e| CommandError::from(RowStoreError::Task(e.to_string())))??;
    Ok(result)
}

// ==================== Excel Commands ====================

pub async fn excel_status(state: &AppState) -> Result<ServiceStatus, CommandError> {
    Ok(state.store.status())
}

/// List spreadsheet files in the data directory
pub async fn excel_files(state: &AppState) -> Result<FilesResponse, CommandError> {
    let files = run_blocking(state, |store| store.list_files()).await?;
    Ok(FilesResponse {
        success: true,
        count: files.len(),
        files,
    })
}

pub async fn excel_sheets(state: &AppState, request: SheetsRequest) -> Result<SheetsResponse, CommandError> {
    let sheets = run_blocking(state, move |store| store.list_sheets(&request.file)).await?;
    Ok(SheetsResponse { success: true, sheets })
}

/// Append a row of values after the last non-blank row
pub async fn excel_append(state: &AppState, request: AppendRequest) -> Result<AppendResponse, CommandError> {
    let row_number = run_blocking(state, move |store| {
        store.append_at(&request.file, &request.sheet, &request.values, request.column_start)
    })
    .await?;

    Ok(AppendResponse {
        success: true,
        row_number,
    })
}

/// Append a row addressed by header names
pub async fn excel_append_object(
    state: &AppState,
    request: AppendObjectRequest,
) -> Result<AppendObjectResponse, CommandError> {
    let outcome = run_blocking(state, move |store| {
        store.append_fields(&request.file, &request.sheet, &request.values)
    })
    .await?;

    Ok(AppendObjectResponse { success: true, outcome })
}

pub async fn excel_read(state: &AppState, request: ReadRequest) -> Result<ReadResponse, CommandError> {
    let data = run_blocking(state, move |store| {
        store.read(&request.file, &request.sheet, request.range.as_deref())
    })
    .await?;

    Ok(ReadResponse {
        success: true,
        row_count: data.len(),
        data,
    })
}

pub async fn excel_update(state: &AppState, request: UpdateRequest) -> Result<MessageResponse, CommandError> {
    let row = request.row;
    run_blocking(state, move |store| {
        store.update_row(&request.file, &request.sheet, request.row, &request.values, request.column_start)
    })
    .await?;

    Ok(MessageResponse {
        success: true,
        message: format!("Row {} updated", row),
    })
}

pub async fn excel_delete(state: &AppState, request: DeleteRequest) -> Result<MessageResponse, CommandError> {
    let row = request.row;
    run_blocking(state, move |store| store.delete_row(&request.file, &request.sheet, request.row)).await?;

    Ok(MessageResponse {
        success: true,
        message: format!("Row {} deleted", row),
    })
}

/// Update named fields on a row or on every lookup match
pub async fn excel_update_advanced(
    state: &AppState,
    request: UpdateAdvancedRequest,
) -> Result<UpdateAdvancedResponse, CommandError> {
    // Target validation happens before any lock is taken
    let target = request.target()?;
    let outcome = run_blocking(state, move |store| {
        store.update_fields(&request.file, &request.sheet, &target, &request.values_to_set)
    })
    .await?;

    Ok(UpdateAdvancedResponse {
        success: true,
        message: format!("{} row(s) updated", outcome.updated_count),
        outcome,
    })
}

/// Delete a row or every lookup match
pub async fn excel_delete_advanced(
    state: &AppState,
    request: DeleteAdvancedRequest,
) -> Result<DeleteAdvancedResponse, CommandError> {
    let target = request.target()?;
    let outcome = run_blocking(state, move |store| store.delete(&request.file, &request.sheet, &target)).await?;

    Ok(DeleteAdvancedResponse {
        success: true,
        message: format!("{} row(s) deleted", outcome.deleted_count),
        outcome,
    })
}

/// Apply several positional operations under one lock
pub async fn excel_batch(state: &AppState, request: BatchRequest) -> Result<BatchResponse, CommandError> {
    let results = run_blocking(state, move |store| {
        store.batch(&request.file, &request.sheet, &request.operations)
    })
    .await?;

    Ok(BatchResponse { success: true, results })
}

pub async fn excel_compact(state: &AppState, request: CompactRequest) -> Result<CompactResponse, CommandError> {
    let removed = run_blocking(state, move |store| {
        store.compact(&request.file, &request.sheet, request.mode)
    })
    .await?;

    Ok(CompactResponse { success: true, removed })
}

fn to_json<T: Serialize>(response: T) -> Result<Value, CommandError> {
    serde_json::to_value(response)
        .map_err(|e| CommandError::from(RowStoreError::InvalidArgument(format!("Failed to encode response: {}", e))))
}

/// Route a request to its command and encode the response
pub async fn dispatch(state: &AppState, request: Request) -> Result<Value, CommandError> {
    match request {
        Request::Status => to_json(excel_status(state).await?),
        Request::Files => to_json(excel_files(state).await?),
        Request::Sheets(r) => to_json(excel_sheets(state, r).await?),
        Request::Append(r) => to_json(excel_append(state, r).await?),
        Request::AppendObject(r) => to_json(excel_append_object(state, r).await?),
        Request::Read(r) => to_json(excel_read(state, r).await?),
        Request::Update(r) => to_json(excel_update(state, r).await?),
        Request::Delete(r) => to_json(excel_delete(state, r).await?),
        Request::UpdateAdvanced(r) => to_json(excel_update_advanced(state, r).await?),
        Request::DeleteAdvanced(r) => to_json(excel_delete_advanced(state, r).await?),
        Request::Batch(r) => to_json(excel_batch(state, r).await?),
        Request::Compact(r) => to_json(excel_compact(state, r).await?),
    }
}

/// Parse a JSON request and dispatch it
pub async fn dispatch_json(state: &AppState, request: &Value) -> Result<Value, CommandError> {
    let request: Request = serde_json::from_value(request.clone())
        .map_err(|e| CommandError::from(RowStoreError::InvalidArgument(format!("Invalid request: {}", e))))?;
    dispatch(state, request).await
}
