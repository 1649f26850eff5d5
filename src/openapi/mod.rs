use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "1.0.0",
        description = r#"
# Storefront Commerce API

A headless storefront backend: catalog, carts, discount codes, pricing quotes, payment-first checkout, and orders.

## Features

- **Catalog**: Products, variants, and per-variant stock levels
- **Carts**: Line management with price snapshots taken at add time
- **Discount Codes**: Percentage, fixed amount, and free shipping codes with scoping, windows, usage limits, and stacking rules
- **Pricing Quotes**: Itemized subtotal, discount, shipping, and tax lines for any open cart
- **Checkout**: Payment is captured before the order row is written; a captured charge that cannot become an order lands on the reconciliation worklist instead of being refunded automatically
- **Orders**: Status lifecycle with guarded transitions and cancellation

All monetary amounts are in CAD.

## Error Handling

The API uses consistent error response formats with appropriate HTTP status codes:

```json
{
  "success": false,
  "error": "validation_error",
  "message": "Quantity must be at least 1",
  "request_id": "a1b2c3",
  "timestamp": "2024-01-01T00:00:00Z"
}
```

Notable statuses: `402` is a terminal payment decline, `409` on checkout carries per-line stock shortages in `details`, and `500` from checkout includes the payment reference when a captured charge needs reconciliation.

## Pagination

List endpoints support pagination with the following query parameters:
- `page`: Page number (default: 1)
- `limit`: Items per page (default: 20)
- `search`: Search term for filtering results
- `sort_by`: Field to sort by
- `sort_order`: Sort order (asc/desc)
        "#,
        contact(
            name = "Storefront API Maintainers",
            email = "api@storefront.dev"
        ),
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080/api/v1", description = "Local development")
    ),
    tags(
        (name = "Products", description = "Catalog and stock endpoints"),
        (name = "Carts", description = "Cart and quote endpoints"),
        (name = "Checkout", description = "Checkout endpoint"),
        (name = "Orders", description = "Order lifecycle endpoints"),
        (name = "Discount Codes", description = "Discount code administration"),
        (name = "Customers", description = "Customer account endpoints"),
        (name = "Payments", description = "Payment lookup and reconciliation endpoints"),
        (name = "Health", description = "Health check endpoints")
    ),
    paths(
        // Catalog
        crate::handlers::products::create_product,
        crate::handlers::products::list_products,
        crate::handlers::products::get_product,
        crate::handlers::products::update_product,
        crate::handlers::products::create_variant,
        crate::handlers::products::get_variant,
        crate::handlers::products::get_inventory_level,
        crate::handlers::products::set_inventory_level,

        // Carts
        crate::handlers::carts::create_cart,
        crate::handlers::carts::get_cart,
        crate::handlers::carts::quote_cart,
        crate::handlers::carts::add_item,
        crate::handlers::carts::update_item,
        crate::handlers::carts::remove_item,
        crate::handlers::carts::clear_cart,
        crate::handlers::carts::apply_discount,
        crate::handlers::carts::remove_discount,

        // Checkout
        crate::handlers::checkout::checkout_cart,

        // Orders
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::get_order_by_number,
        crate::handlers::orders::update_order_status,
        crate::handlers::orders::cancel_order,

        // Discount codes
        crate::handlers::discounts::create_discount_code,
        crate::handlers::discounts::list_discount_codes,
        crate::handlers::discounts::get_discount_code,
        crate::handlers::discounts::get_discount_code_by_code,
        crate::handlers::discounts::update_discount_code,
        crate::handlers::discounts::deactivate_discount_code,
        crate::handlers::discounts::discount_code_statistics,
        crate::handlers::discounts::validate_discount_code,

        // Customers
        crate::handlers::customers::create_customer,
        crate::handlers::customers::list_customers,
        crate::handlers::customers::get_customer,

        // Payments
        crate::handlers::payments::get_payment,
        crate::handlers::payments::list_reconciliation_worklist,
    ),
    components(
        schemas(
            // Common types
            crate::ApiResponse<serde_json::Value>,
            crate::PaginatedResponse<serde_json::Value>,
            crate::ListQuery,

            // Catalog types
            crate::handlers::products::CreateProductRequest,
            crate::handlers::products::UpdateProductRequest,
            crate::handlers::products::CreateVariantRequest,
            crate::handlers::products::SetInventoryLevelRequest,
            crate::handlers::products::ProductResponse,
            crate::handlers::products::VariantResponse,
            crate::handlers::products::InventoryLevelResponse,

            // Cart types
            crate::handlers::carts::NewCartRequest,
            crate::handlers::carts::AddCartItemRequest,
            crate::handlers::carts::UpdateCartItemRequest,
            crate::handlers::carts::ApplyDiscountRequest,
            crate::handlers::carts::CartResponse,
            crate::handlers::carts::CartItemResponse,
            crate::handlers::carts::AppliedCodeResponse,
            crate::handlers::carts::CartQuoteResponse,

            // Checkout types
            crate::handlers::checkout::CheckoutAddress,
            crate::handlers::checkout::CheckoutPayload,
            crate::handlers::checkout::CheckoutResponse,

            // Order types
            crate::handlers::orders::UpdateOrderStatusRequest,
            crate::handlers::orders::OrderResponse,
            crate::handlers::orders::OrderItemResponse,

            // Discount code types
            crate::handlers::discounts::NewDiscountCodeRequest,
            crate::handlers::discounts::PatchDiscountCodeRequest,
            crate::handlers::discounts::DiscountCodeResponse,
            crate::handlers::discounts::ValidateDiscountRequest,
            crate::handlers::discounts::DiscountPreviewResponse,
            crate::handlers::discounts::DiscountStatsResponse,

            // Customer types
            crate::handlers::customers::NewCustomerRequest,
            crate::handlers::customers::CustomerResponse,

            // Payment types
            crate::handlers::payments::PaymentResponse,

            // Pricing types
            crate::services::pricing::PriceQuote,
            crate::services::pricing::AppliedDiscount,
            crate::services::pricing::RejectedDiscount,
            crate::services::pricing::RejectionReason,

            // Error types
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
