use overdue_client::commands::batch::BatchRunOptions;
use overdue_client::commands::customers::CustomerAddOptions;
use overdue_client::commands::escalate::EscalateOptions;
use overdue_client::commands::invoices::{FlagOverdueOptions, InvoiceAddOptions, InvoicePayOptions};
use overdue_client::commands::policy::{PolicyCreateOptions, PolicyUpdateOptions};
use overdue_client::commands::reports::{
    OverdueReportOptions, StatsReportOptions, UpcomingReportOptions,
};
use overdue_client::commands::service::{AutoReactivateOptions, ServiceChangeOptions};
use overdue_client::commands::{
    batch, customers, escalate, invoices, policy, reports, service,
};
use overdue_client::{ClientResult, SuccessEnvelope};

use crate::cli::{
    BatchCommand, Cli, Commands, CustomerCommand, InvoiceCommand, PolicyCommand, ReportCommand,
    ServiceCommand,
};

pub fn dispatch(cli: &Cli) -> ClientResult<SuccessEnvelope> {
    let home = cli.home.as_deref();
    let actor = cli.actor.clone();

    match &cli.command {
        Commands::Customer { command } => match command {
            CustomerCommand::Add { name, id, email } => customers::add(CustomerAddOptions {
                customer_id: id.clone(),
                name: name.clone(),
                email: email.clone(),
                actor,
                home_override: home,
                now: None,
            }),
        },
        Commands::Invoice { command } => match command {
            InvoiceCommand::Add {
                number,
                amount,
                currency,
                customer,
                issued,
                due,
                overdue,
            } => invoices::add(InvoiceAddOptions {
                customer_id: customer.clone(),
                number: number.clone(),
                total_amount: *amount,
                currency: currency.clone(),
                issued_at: *issued,
                due_at: *due,
                overdue: *overdue,
                actor,
                home_override: home,
                now: None,
            }),
            InvoiceCommand::Pay {
                invoice_id,
                paid_at,
            } => invoices::pay(InvoicePayOptions {
                invoice_id: invoice_id.clone(),
                paid_at: *paid_at,
                actor,
                home_override: home,
                now: None,
            }),
            InvoiceCommand::FlagOverdue => invoices::flag_overdue(FlagOverdueOptions {
                actor,
                home_override: home,
                now: None,
            }),
        },
        Commands::Policy { command } => match command {
            PolicyCommand::Create {
                customer_id,
                fields,
            } => policy::create(PolicyCreateOptions {
                customer_id: customer_id.clone(),
                overrides: fields.to_overrides(),
                actor,
                home_override: home,
                now: None,
            }),
            PolicyCommand::Update { policy_id, fields } => policy::update(PolicyUpdateOptions {
                policy_id: policy_id.clone(),
                overrides: fields.to_overrides(),
                actor,
                home_override: home,
                now: None,
            }),
            PolicyCommand::Show { customer_id } => policy::show(customer_id, home),
        },
        Commands::Escalate {
            level,
            invoice_id,
            send_email,
            no_email,
            no_suspend,
        } => escalate::run(EscalateOptions {
            invoice_id: invoice_id.clone(),
            level: *level,
            send_email: notice_choice(*send_email, *no_email),
            suspend: no_suspend.then_some(false),
            actor,
            home_override: home,
            now: None,
            notifier: None,
        }),
        Commands::Service { command } => match command {
            ServiceCommand::Suspend {
                customer_id,
                reason,
            } => service::suspend(ServiceChangeOptions {
                customer_id: customer_id.clone(),
                reason: Some(reason.clone()),
                actor,
                home_override: home,
                now: None,
            }),
            ServiceCommand::Reactivate {
                customer_id,
                reason,
            } => service::reactivate(ServiceChangeOptions {
                customer_id: customer_id.clone(),
                reason: reason.clone(),
                actor,
                home_override: home,
                now: None,
            }),
            ServiceCommand::AutoReactivate { invoice_id } => {
                service::auto_reactivate(AutoReactivateOptions {
                    invoice_id: invoice_id.clone(),
                    actor,
                    home_override: home,
                    now: None,
                })
            }
            ServiceCommand::Check { customer_id } => service::check(customer_id, home),
        },
        Commands::Batch { command } => match command {
            BatchCommand::Run {
                page_size,
                max_invoices,
            } => batch::run(BatchRunOptions {
                page_size: *page_size,
                max_invoices: *max_invoices,
                actor,
                home_override: home,
                now: None,
                notifier: None,
            }),
        },
        Commands::Report { command } => match command {
            ReportCommand::Overdue { customer, level } => {
                reports::overdue(OverdueReportOptions {
                    customer_id: customer.clone(),
                    level: *level,
                    home_override: home,
                    now: None,
                })
            }
            ReportCommand::History { customer_id } => reports::history(customer_id, home),
            ReportCommand::Suspended => reports::suspended(home),
            ReportCommand::Stats { from, to } => reports::stats(StatsReportOptions {
                from: from.clone(),
                to: to.clone(),
                home_override: home,
            }),
            ReportCommand::Upcoming { days_ahead } => reports::upcoming(UpcomingReportOptions {
                days_ahead: *days_ahead,
                home_override: home,
                now: None,
            }),
        },
    }
}

fn notice_choice(send_email: bool, no_email: bool) -> Option<bool> {
    match (send_email, no_email) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}
