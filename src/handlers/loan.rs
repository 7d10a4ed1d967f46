//! Loan lifecycle handlers

use std::sync::Arc;

use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::{JsonRejection, QueryRejection},
        Multipart, Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::error::{ApiError, ApiResult};
use crate::loan::{
    AddInvestmentRequest, Approval, CreateLoanRequest, Disbursement, Investment,
    InvestmentReceipt, ListLoansQuery, LoanResponse, LoanService, LoanState,
};
use crate::models::{ApiResponse, PaginationMeta};
use crate::storage::DocumentStore;
use crate::store::LoanFilter;

fn parse_loan_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ApiError::InvalidId)
}

/// Read one identity text field and one uploaded file from a multipart form.
/// Returns the trimmed identity, the client file name and the file bytes.
async fn read_document_form(
    mut multipart: Multipart,
    identity_field: &str,
    file_field: &str,
) -> ApiResult<(String, String, Vec<u8>)> {
    let mut identity = None;
    let mut file_name = String::new();
    let mut file = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        if name == identity_field {
            identity = Some(field.text().await?);
        } else if name == file_field {
            file_name = field.file_name().unwrap_or_default().to_string();
            file = Some(field.bytes().await?.to_vec());
        }
    }

    let identity = identity
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::ValidationError(format!("{} is required", identity_field)))?;

    let file = file
        .filter(|bytes| !bytes.is_empty())
        .ok_or_else(|| ApiError::ValidationError(format!("{} file is required", file_field)))?;

    Ok((identity, file_name, file))
}

async fn store_document(
    documents: &Arc<dyn DocumentStore>,
    file_name: &str,
    bytes: &[u8],
) -> ApiResult<String> {
    let stored = documents.save(file_name, bytes).await.map_err(|e| {
        tracing::error!(error = ?e, "Failed to store uploaded document");
        ApiError::StorageError(e.to_string())
    })?;
    Ok(stored.url)
}

/// Propose a new loan
pub async fn create_loan(
    State(service): State<Arc<LoanService>>,
    payload: Result<Json<CreateLoanRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ApiResponse<LoanResponse>>)> {
    let Json(request) = payload?;
    request.validate()?;

    let loan = service
        .create_loan(
            &request.borrower_id,
            request.principal_amount,
            request.rate,
            request.roi,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(loan.into()))))
}

/// List loans with optional state filter and paging
pub async fn list_loans(
    State(service): State<Arc<LoanService>>,
    query: Result<Query<ListLoansQuery>, QueryRejection>,
) -> ApiResult<Json<ApiResponse<Vec<LoanResponse>>>> {
    let Query(query) = query?;

    let state = match query.state.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(LoanState::parse(raw).ok_or_else(|| {
            ApiError::ValidationError(format!("Unknown loan state: {}", raw))
        })?),
    };

    let filter = LoanFilter::new(state, query.limit, query.offset);
    let page = service.list_loans(filter).await?;

    let meta = PaginationMeta {
        total: page.total,
        limit: filter.limit,
        offset: filter.offset,
    };
    let loans = page.loans.into_iter().map(LoanResponse::from).collect();

    Ok(Json(ApiResponse::paginated(loans, meta)))
}

/// Get a single loan
pub async fn get_loan(
    State(service): State<Arc<LoanService>>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<LoanResponse>>> {
    let loan = service.get_loan(parse_loan_id(&id)?).await?;
    Ok(Json(ApiResponse::ok(loan.into())))
}

/// Approve a proposed loan with a field validator's picture proof
pub async fn approve_loan(
    State(service): State<Arc<LoanService>>,
    State(documents): State<Arc<dyn DocumentStore>>,
    Path(id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<ApiResponse<LoanResponse>>> {
    let loan_id = parse_loan_id(&id)?;
    let (field_validator_id, file_name, bytes) =
        read_document_form(multipart?, "field_validator_id", "picture_proof").await?;

    // Unknown loans must not leave an orphaned upload behind
    service.get_loan(loan_id).await?;
    let proof_url = store_document(&documents, &file_name, &bytes).await?;

    let loan = service
        .approve_loan(loan_id, &field_validator_id, &proof_url)
        .await?;

    Ok(Json(ApiResponse::ok(loan.into())))
}

pub async fn get_approval(
    State(service): State<Arc<LoanService>>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<Approval>>> {
    let approval = service.get_approval(parse_loan_id(&id)?).await?;
    Ok(Json(ApiResponse::ok(approval)))
}

/// Invest in an approved loan
pub async fn add_investment(
    State(service): State<Arc<LoanService>>,
    Path(id): Path<String>,
    payload: Result<Json<AddInvestmentRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ApiResponse<InvestmentReceipt>>)> {
    let loan_id = parse_loan_id(&id)?;
    let Json(request) = payload?;
    request.validate()?;

    let (loan, investment) = service
        .add_investment(loan_id, &request.investor_id, request.amount)
        .await?;

    let receipt = InvestmentReceipt {
        loan: loan.into(),
        investment,
    };

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(receipt))))
}

pub async fn list_investments(
    State(service): State<Arc<LoanService>>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<Vec<Investment>>>> {
    let investments = service.list_investments(parse_loan_id(&id)?).await?;
    Ok(Json(ApiResponse::ok(investments)))
}

/// Disburse an invested loan against the signed agreement
pub async fn disburse_loan(
    State(service): State<Arc<LoanService>>,
    State(documents): State<Arc<dyn DocumentStore>>,
    Path(id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<ApiResponse<LoanResponse>>> {
    let loan_id = parse_loan_id(&id)?;
    let (field_officer_id, file_name, bytes) =
        read_document_form(multipart?, "field_officer_id", "signed_agreement").await?;

    service.get_loan(loan_id).await?;
    let agreement_url = store_document(&documents, &file_name, &bytes).await?;

    let loan = service
        .disburse_loan(loan_id, &field_officer_id, &agreement_url)
        .await?;

    Ok(Json(ApiResponse::ok(loan.into())))
}

pub async fn get_disbursement(
    State(service): State<Arc<LoanService>>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<Disbursement>>> {
    let disbursement = service.get_disbursement(parse_loan_id(&id)?).await?;
    Ok(Json(ApiResponse::ok(disbursement)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_loan_id() {
        let id = Uuid::new_v4();
        assert_eq!(parse_loan_id(&id.to_string()).unwrap(), id);
        assert!(matches!(parse_loan_id("not-a-uuid"), Err(ApiError::InvalidId)));
    }
}
