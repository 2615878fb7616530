use crate::acme::{AcmeClient, OrderError};
use crate::certificate::{CertificateRequest, CertificateResponse};
use crate::challenge::AuthorizationChallenge;
use crate::https_helper::HttpClient;
use crate::solver::Solver;
use crate::validator::Validator;

/// Obtains a certificate for every name of `request`.
///
/// For each domain that is not authorized yet, the first challenge `solver`
/// supports is solved, checked locally with `validator` and then verified by
/// the CA. A failed local check is logged and the CA is asked anyway. Solved
/// challenges are cleaned up whatever the outcome, then the order is
/// finalized.
pub async fn issue<H: HttpClient>(
    client: &mut AcmeClient<H>,
    request: &CertificateRequest,
    solver: &dyn Solver,
    validator: &dyn Validator,
) -> Result<CertificateResponse, OrderError> {
    let domains = request.distinguished_name().domains();
    let order = client.request_order(&domains).await?;
    let mut selected = Vec::new();
    for (domain, challenges) in order.challenges() {
        if challenges.iter().any(AuthorizationChallenge::is_valid) {
            log::info!("{} is already authorized", domain);
            continue;
        }
        match challenges.iter().find(|challenge| solver.supports(challenge)) {
            Some(challenge) => selected.push(challenge.clone()),
            None => return Err(OrderError::ChallengeNotSupported(domain.clone())),
        }
    }

    let mut solved = Vec::new();
    let result = authorize(client, &selected, &mut solved, solver, validator).await;
    for challenge in &solved {
        if let Err(err) = solver.cleanup(challenge).await {
            log::warn!("cleanup of {} challenge for {} failed: {}", challenge.kind(), challenge.domain(), err);
        }
    }
    result?;
    log::info!("completed all authorizations");
    client.finalize_order(&order, request, None).await
}

async fn authorize<H: HttpClient>(
    client: &mut AcmeClient<H>,
    selected: &[AuthorizationChallenge],
    solved: &mut Vec<AuthorizationChallenge>,
    solver: &dyn Solver,
    validator: &dyn Validator,
) -> Result<(), OrderError> {
    for challenge in selected {
        solver.solve(challenge).await?;
        solved.push(challenge.clone());
    }
    for challenge in selected {
        if !validator.is_valid(challenge, solver).await? {
            log::warn!(
                "{} challenge for {} is not visible locally, asking the CA anyway",
                challenge.kind(),
                challenge.domain()
            );
        }
        client.challenge_authorization(challenge, None).await?;
    }
    Ok(())
}
