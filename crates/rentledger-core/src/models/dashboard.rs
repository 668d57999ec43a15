use std::collections::HashSet;

use serde::Serialize;

use super::{PaymentStatus, RentPayment, Tenant};

/// Summary figures for an owner's dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardStats {
    pub total_tenants: usize,
    /// Sum of every recorded payment for the owner's tenants
    pub total_revenue: f64,
    pub pending_payments: usize,
    pub failed_payments: usize,
}

impl DashboardStats {
    /// Compute stats from the owner's tenants and a payment listing.
    /// Payments for tenants outside `tenants` are ignored.
    pub fn compute(tenants: &[Tenant], payments: &[RentPayment]) -> Self {
        let owned: HashSet<&str> = tenants.iter().map(|t| t.id.as_str()).collect();
        let mut stats = DashboardStats {
            total_tenants: tenants.len(),
            ..Default::default()
        };

        for payment in payments.iter().filter(|p| owned.contains(p.tenant_id.as_str())) {
            stats.total_revenue += payment.amount_paid;
            match payment.status {
                PaymentStatus::Pending => stats.pending_payments += 1,
                PaymentStatus::Failed => stats.failed_payments += 1,
                PaymentStatus::Completed | PaymentStatus::Other => {}
            }
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::payment::tests::sample_payment;
    use crate::models::tenant::tests::sample_tenant;

    #[test]
    fn test_compute_empty() {
        assert_eq!(DashboardStats::compute(&[], &[]), DashboardStats::default());
    }

    #[test]
    fn test_compute_counts_owned_payments_only() {
        let tenants = vec![sample_tenant("t-1", "A", 1000.0), sample_tenant("t-2", "B", 800.0)];
        let payments = vec![
            sample_payment("p-1", "t-1", 1000.0, PaymentStatus::Completed),
            sample_payment("p-2", "t-2", 800.0, PaymentStatus::Pending),
            sample_payment("p-3", "t-2", 50.0, PaymentStatus::Failed),
            sample_payment("p-4", "t-other", 999.0, PaymentStatus::Completed),
        ];

        let stats = DashboardStats::compute(&tenants, &payments);
        assert_eq!(stats.total_tenants, 2);
        assert_eq!(stats.total_revenue, 1850.0);
        assert_eq!(stats.pending_payments, 1);
        assert_eq!(stats.failed_payments, 1);
    }
}
