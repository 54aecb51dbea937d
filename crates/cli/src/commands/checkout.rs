//! Checkout command.

use subshare_storefront::checkout::Buyer;
use subshare_storefront::{EngineError, Storefront};

/// Submit the cart and print the issued codes.
///
/// # Errors
///
/// Returns an error if validation fails or the purchase backend rejects or
/// cannot be reached. The cart is unchanged in that case.
pub async fn submit(storefront: &Storefront, name: String, email: String) -> Result<(), EngineError> {
    let buyer = Buyer { name, email };
    let result = storefront.checkout(&buyer).await?;

    #[allow(clippy::print_stdout)]
    {
        if result.is_returning_user {
            println!("Welcome back! Your user code is still {}", result.user_code);
        } else {
            println!("Welcome! Your user code is {}", result.user_code);
        }
        println!("Product codes (awaiting approval):");
        for code in &result.product_codes {
            println!(
                "  {} {} [{}]",
                code.code,
                code.product_name.as_deref().unwrap_or(code.product_id.as_str()),
                code.status
            );
        }
        println!(
            "Total: {}",
            subshare_core::Price::new(result.total_amount, result.currency)
        );
    }

    Ok(())
}
