use chrono::Utc;
use common::{CouponId, CustomerId, OrderId, ProductId};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{Cart, CartOwner, Coupon, CouponKind, Money, Order, OrderDraft, OrderLine, ProductSnapshot};

fn album(title: &str, cents: i64) -> ProductSnapshot {
    ProductSnapshot::new(
        ProductId::new(),
        title.to_lowercase().replace(' ', "-"),
        title,
        "Bench Artist",
        "LP",
        None,
        Money::from_cents(cents),
        None,
    )
    .unwrap()
}

fn bench_cart_totals(c: &mut Criterion) {
    let now = Utc::now();
    let mut cart = Cart::for_customer(CustomerId::new(), now);
    for i in 0..20 {
        let product = album(&format!("Album {i}"), 1000 + i * 37);
        cart.add_item(&product, 1 + (i as u32 % 3), now).unwrap();
    }
    let coupon = Coupon::new(CouponId::new(), "BENCH", CouponKind::Percentage, 15)
        .with_max_discount(Money::from_cents(2_500));

    c.bench_function("domain/cart_totals_20_lines", |b| {
        b.iter(|| cart.totals(Some(&coupon), now));
    });
}

fn bench_discount_evaluation(c: &mut Criterion) {
    let now = Utc::now();
    let coupon = Coupon::new(CouponId::new(), "BENCH", CouponKind::Percentage, 15)
        .with_min_order(Money::from_cents(1_500))
        .with_max_discount(Money::from_cents(2_500))
        .with_usage_limit(1_000);

    c.bench_function("domain/coupon_discount", |b| {
        b.iter(|| coupon.discount_for(Money::from_cents(19_999), now));
    });
}

fn bench_place_order(c: &mut Criterion) {
    let now = Utc::now();
    let lines: Vec<OrderLine> = (0..10)
        .map(|i| {
            OrderLine::new(
                ProductId::new(),
                format!("Album {i}"),
                "Bench Artist",
                "LP",
                None,
                2,
                Money::from_cents(1999),
            )
        })
        .collect();

    c.bench_function("domain/place_order_10_lines", |b| {
        b.iter(|| {
            let draft = OrderDraft {
                id: OrderId::new(),
                order_number: "REC-20260806-0001".to_string(),
                placed_by: CartOwner::Customer(CustomerId::new()),
                lines: lines.clone(),
                coupon_code: None,
                discount_amount: Money::from_cents(400),
                shipping_amount: Money::from_cents(500),
                tax_amount: Money::from_cents(350),
                shipping_method: "standard".to_string(),
                shipping_address: serde_json::json!({"city": "Portland"}),
                billing_address: serde_json::json!({"city": "Portland"}),
                customer_notes: None,
                currency: "USD".to_string(),
            };
            Order::place(draft, now).unwrap()
        });
    });
}

criterion_group!(
    benches,
    bench_cart_totals,
    bench_discount_evaluation,
    bench_place_order,
);
criterion_main!(benches);
