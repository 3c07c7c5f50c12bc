//! The pay-as-you-go purchase journey as an explicit state machine.
//!
//! Each [`FlowStep`] has an action and, except for the last two, a named
//! post-condition that must hold before the next step starts. A step that
//! fails is reported as a [`StepFailure`] naming the step, so a red scenario
//! says where the journey broke instead of only that the final check did
//! not pass.
//!
//! Out-of-stock handsets never show the "existing customer?" prompt, so the
//! `HandsetSelect` post-condition catches them.

use crate::isolation::PageHandle;
use crate::locator::{Locator, Role, TextMatch};
use crate::result::{FlowError, FlowResult, StepFailure};
use crate::scenario::Scenario;
use crate::sink::DiagnosticSink;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Diagnostic label for journey lines
pub const FLOW_LABEL: &str = "PAYG Phone Test";

/// Steps of the journey, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowStep {
    /// Open the home page and reject cookies
    Landing,
    /// Open the pay-as-you-go phones category
    CategorySelect,
    /// Pick a handset by ordinal
    HandsetSelect,
    /// Answer "No" to the existing-customer prompt
    CustomerQuery,
    /// Ask for a new number
    NumberChoice,
    /// Pick a plan by ordinal
    PlanSelect,
    /// Continue to the basket
    BasketContinue,
    /// Continue past the review
    ReviewContinue,
    /// Go to checkout
    CheckoutNav,
    /// Check the checkout page is shown
    Verify,
}

impl FlowStep {
    /// Every step in execution order
    pub const ALL: [Self; 10] = [
        Self::Landing,
        Self::CategorySelect,
        Self::HandsetSelect,
        Self::CustomerQuery,
        Self::NumberChoice,
        Self::PlanSelect,
        Self::BasketContinue,
        Self::ReviewContinue,
        Self::CheckoutNav,
        Self::Verify,
    ];

    /// Step name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Landing => "Landing",
            Self::CategorySelect => "CategorySelect",
            Self::HandsetSelect => "HandsetSelect",
            Self::CustomerQuery => "CustomerQuery",
            Self::NumberChoice => "NumberChoice",
            Self::PlanSelect => "PlanSelect",
            Self::BasketContinue => "BasketContinue",
            Self::ReviewContinue => "ReviewContinue",
            Self::CheckoutNav => "CheckoutNav",
            Self::Verify => "Verify",
        }
    }

    /// Zero-based position in [`FlowStep::ALL`]
    #[must_use]
    pub const fn position(self) -> usize {
        self as usize
    }

    /// Step that follows this one
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Landing => Some(Self::CategorySelect),
            Self::CategorySelect => Some(Self::HandsetSelect),
            Self::HandsetSelect => Some(Self::CustomerQuery),
            Self::CustomerQuery => Some(Self::NumberChoice),
            Self::NumberChoice => Some(Self::PlanSelect),
            Self::PlanSelect => Some(Self::BasketContinue),
            Self::BasketContinue => Some(Self::ReviewContinue),
            Self::ReviewContinue => Some(Self::CheckoutNav),
            Self::CheckoutNav => Some(Self::Verify),
            Self::Verify => None,
        }
    }
}

impl fmt::Display for FlowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The locators the journey relies on. Data, so a site redesign is a
/// configuration change rather than a code change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowLocators {
    /// Cookie banner's reject button
    pub reject_cookies: Locator,
    /// Pay-as-you-go phones category link
    pub payg_category: Locator,
    /// Handset cards
    pub handset: Locator,
    /// "No" answer to the existing-customer prompt
    pub not_existing_customer: Locator,
    /// New-number choice
    pub new_number: Locator,
    /// Plan buttons
    pub plan: Locator,
    /// Continue to basket
    pub continue_to_basket: Locator,
    /// Continue past the review (exact, so it never hits "Continue shopping")
    pub review_continue: Locator,
    /// Go to checkout
    pub go_to_checkout: Locator,
    /// Checkout step-list entry proving checkout loaded
    pub secure_checkout: Locator,
}

impl Default for FlowLocators {
    fn default() -> Self {
        Self {
            reject_cookies: Locator::role(Role::Button, TextMatch::contains("Reject")),
            payg_category: Locator::role(
                Role::Link,
                TextMatch::contains("Pay as you go phones Prepay"),
            ),
            handset: Locator::role(Role::Button, TextMatch::contains("Phone from €")),
            not_existing_customer: Locator::role(Role::Link, TextMatch::exact("No")),
            new_number: Locator::role(Role::Link, TextMatch::contains("Get a new number")),
            plan: Locator::role(Role::Button, TextMatch::exact("Get this plan")),
            continue_to_basket: Locator::role(
                Role::Button,
                TextMatch::contains("Continue to basket"),
            ),
            review_continue: Locator::role(Role::Button, TextMatch::exact("Continue")),
            go_to_checkout: Locator::role(Role::Button, TextMatch::contains("Go to checkout")),
            secure_checkout: Locator::text("li", TextMatch::contains("Secure Checkout")),
        }
    }
}

/// One page interaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum Action {
    /// Navigate
    Goto {
        /// Target URL
        url: String,
    },
    /// Click the only match
    Click {
        /// Target
        locator: Locator,
    },
    /// Click the `index`-th match
    ClickNth {
        /// Targets
        locator: Locator,
        /// Zero-based ordinal
        index: usize,
    },
    /// Assert the first match is visible
    ExpectVisible {
        /// Target
        locator: Locator,
    },
}

/// Named check that must hold after a step's actions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostCondition {
    /// Check name, reported on failure
    pub name: String,
    /// Element that must become visible
    pub visible: Locator,
}

impl PostCondition {
    fn visible(name: &str, visible: &Locator) -> Option<Self> {
        Some(Self {
            name: name.to_string(),
            visible: visible.clone(),
        })
    }
}

/// A step resolved for one scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepPlan {
    /// Step
    pub step: FlowStep,
    /// Diagnostic line logged before acting
    pub message: String,
    /// Interactions, in order
    pub actions: Vec<Action>,
    /// Check after the actions
    pub post: Option<PostCondition>,
}

/// What a passing run went through
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowReport {
    /// Scenario that ran
    pub scenario: Scenario,
    /// Steps completed, in order
    pub steps: Vec<FlowStep>,
    /// Wall-clock time
    pub duration: Duration,
}

/// Drives the journey on a page
#[derive(Debug, Clone)]
pub struct FlowExecutor {
    base_url: String,
    locators: FlowLocators,
    sink: Arc<DiagnosticSink>,
}

impl FlowExecutor {
    /// Executor starting at `base_url` with the default locators
    #[must_use]
    pub fn new(base_url: impl Into<String>, sink: Arc<DiagnosticSink>) -> Self {
        Self {
            base_url: base_url.into(),
            locators: FlowLocators::default(),
            sink,
        }
    }

    /// Replace the locators
    #[must_use]
    pub fn with_locators(mut self, locators: FlowLocators) -> Self {
        self.locators = locators;
        self
    }

    /// Current locators
    #[must_use]
    pub const fn locators(&self) -> &FlowLocators {
        &self.locators
    }

    /// The journey resolved for `scenario`, without touching a page
    #[must_use]
    pub fn plan(&self, scenario: Scenario) -> Vec<StepPlan> {
        FlowStep::ALL
            .iter()
            .map(|&step| self.plan_step(step, scenario))
            .collect()
    }

    fn plan_step(&self, step: FlowStep, scenario: Scenario) -> StepPlan {
        let l = &self.locators;
        let click = |locator: &Locator| Action::Click {
            locator: locator.clone(),
        };
        let (message, actions, post) = match step {
            FlowStep::Landing => (
                "Opening Vodafone and rejecting cookies".to_string(),
                vec![
                    Action::Goto {
                        url: self.base_url.clone(),
                    },
                    click(&l.reject_cookies),
                ],
                PostCondition::visible("payg category link visible", &l.payg_category),
            ),
            FlowStep::CategorySelect => (
                "Selecting PAYG phones".to_string(),
                vec![click(&l.payg_category)],
                PostCondition::visible("handset cards visible", &l.handset),
            ),
            FlowStep::HandsetSelect => (
                format!("Selecting phone #{}", scenario.handset_index),
                vec![Action::ClickNth {
                    locator: l.handset.clone(),
                    index: scenario.handset_index,
                }],
                PostCondition::visible("existing-customer prompt visible", &l.not_existing_customer),
            ),
            FlowStep::CustomerQuery => (
                "Selecting no".to_string(),
                vec![click(&l.not_existing_customer)],
                PostCondition::visible("number choice visible", &l.new_number),
            ),
            FlowStep::NumberChoice => (
                "Selecting new number".to_string(),
                vec![click(&l.new_number)],
                PostCondition::visible("plans visible", &l.plan),
            ),
            FlowStep::PlanSelect => (
                "Selecting plan".to_string(),
                vec![Action::ClickNth {
                    locator: l.plan.clone(),
                    index: scenario.plan_index,
                }],
                PostCondition::visible("basket visible", &l.continue_to_basket),
            ),
            FlowStep::BasketContinue => (
                "Selecting continue to basket".to_string(),
                vec![click(&l.continue_to_basket)],
                PostCondition::visible("review visible", &l.review_continue),
            ),
            FlowStep::ReviewContinue => (
                "Selecting continue".to_string(),
                vec![click(&l.review_continue)],
                PostCondition::visible("checkout link visible", &l.go_to_checkout),
            ),
            FlowStep::CheckoutNav => (
                "Selecting go to checkout".to_string(),
                vec![click(&l.go_to_checkout)],
                None,
            ),
            FlowStep::Verify => (
                "Expecting checkout".to_string(),
                vec![Action::ExpectVisible {
                    locator: l.secure_checkout.clone(),
                }],
                None,
            ),
        };
        StepPlan {
            step,
            message,
            actions,
            post,
        }
    }

    /// Run the journey for `scenario` on `page`.
    ///
    /// # Errors
    ///
    /// The first failing step, with its cause.
    pub async fn run(
        &self,
        page: &mut PageHandle,
        scenario: Scenario,
    ) -> Result<FlowReport, StepFailure> {
        let started = Instant::now();
        let mut steps = Vec::with_capacity(FlowStep::ALL.len());
        let mut current = Some(FlowStep::Landing);

        while let Some(step) = current {
            let plan = self.plan_step(step, scenario);
            self.sink.log(FLOW_LABEL, plan.message.as_str());
            tracing::debug!(context = %page.id(), %scenario, %step, "step started");

            Self::execute(page, &plan)
                .await
                .map_err(|cause| StepFailure::new(step, scenario, cause))?;

            steps.push(step);
            current = step.next();
        }

        Ok(FlowReport {
            scenario,
            steps,
            duration: started.elapsed(),
        })
    }

    async fn execute(page: &mut PageHandle, plan: &StepPlan) -> FlowResult<()> {
        for action in &plan.actions {
            match action {
                Action::Goto { url } => page.goto(url).await?,
                Action::Click { locator } => page.click(locator).await?,
                Action::ClickNth { locator, index } => page.click_nth(locator, *index).await?,
                Action::ExpectVisible { locator } => page.expect_visible(locator).await?,
            }
        }
        if let Some(post) = &plan.post {
            if !page.wait_visible(&post.visible).await? {
                return Err(FlowError::PostConditionFailed {
                    check: post.name.clone(),
                    message: format!("{} did not become visible", post.visible),
                });
            }
        }
        Ok(())
    }
}
