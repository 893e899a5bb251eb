//! Static pages. The dashboard is a single self-contained document that polls
//! `/api/data`; all rendering happens in the browser.

pub const DASHBOARD_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Calendar Spread Screener</title>
<style>
  body { font-family: -apple-system, Segoe UI, Helvetica, Arial, sans-serif; margin: 2rem; background: #f6f7f9; color: #1d2330; }
  h1 { margin-bottom: 0.2rem; }
  .muted { color: #6b7280; font-size: 0.9rem; }
  .stats { display: flex; gap: 1rem; margin: 1.2rem 0; flex-wrap: wrap; }
  .card { background: #fff; border-radius: 8px; padding: 0.8rem 1.2rem; box-shadow: 0 1px 2px rgba(0,0,0,.08); min-width: 9rem; }
  .card .value { font-size: 1.5rem; font-weight: 600; }
  table { border-collapse: collapse; width: 100%; background: #fff; margin-bottom: 2rem; }
  th, td { padding: 0.45rem 0.6rem; border-bottom: 1px solid #e5e7eb; text-align: right; }
  th:first-child, td:first-child { text-align: left; }
  tr.qualified td { background: #ecfdf5; }
  button { padding: 0.4rem 0.9rem; border-radius: 6px; border: 1px solid #cbd5e1; background: #fff; cursor: pointer; }
</style>
</head>
<body>
<h1>Calendar Spread Screener</h1>
<div class="muted">Source: <span id="source">-</span> &middot; Last scan: <span id="last-scan">-</span> &middot; Next scan: <span id="next-scan">-</span></div>
<div class="stats">
  <div class="card"><div class="muted">Analyzed</div><div class="value" id="total">-</div></div>
  <div class="card"><div class="muted">Qualified</div><div class="value" id="qualified">-</div></div>
  <div class="card"><div class="muted">Success rate</div><div class="value" id="rate">-</div></div>
  <div class="card"><div class="muted">Avg criteria met</div><div class="value" id="avg">-</div></div>
</div>
<button id="refresh">Refresh scan</button>
<h2>Stocks</h2>
<table>
  <thead><tr><th>Symbol</th><th>Price</th><th>ATR %</th><th>IV</th><th>IV pct</th><th>Open interest</th><th>Stability</th><th>Criteria</th><th>Source</th></tr></thead>
  <tbody id="stocks"></tbody>
</table>
<h2>Calendar spreads</h2>
<table>
  <thead><tr><th>Symbol</th><th>Strategy</th><th>Strike</th><th>Front</th><th>Back</th><th>Profit zone</th><th>Breakeven</th><th>R/R</th></tr></thead>
  <tbody id="spreads"></tbody>
</table>
<script>
const fmt = (v, d = 2) => (v === null || v === undefined) ? "-" : Number(v).toFixed(d);
const range = (lo, hi) => `${fmt(lo)} - ${fmt(hi)}`;

function render(data) {
  const s = data.system_stats;
  document.getElementById("source").textContent = data.data_source;
  document.getElementById("last-scan").textContent = s.last_scan_time || "-";
  document.getElementById("next-scan").textContent = s.next_scan_time || "-";
  document.getElementById("total").textContent = s.total_stocks_analyzed;
  document.getElementById("qualified").textContent = s.qualified_stocks;
  document.getElementById("rate").textContent = fmt(s.success_rate, 1) + "%";
  document.getElementById("avg").textContent = fmt(s.average_criteria_met);

  document.getElementById("stocks").innerHTML = data.all_stocks.map(r => `
    <tr class="${r.qualified ? "qualified" : ""}">
      <td>${r.symbol}</td><td>${fmt(r.current_price)}</td><td>${fmt(r.atr_percentage, 4)}</td>
      <td>${fmt(r.implied_volatility, 1)}</td><td>${fmt(r.iv_percentile, 1)}</td><td>${r.open_interest}</td>
      <td>${fmt(r.price_stability_30d, 4)}</td><td>${r.criteria_met_count}/8</td>
      <td>${r.data_source}${r.fallback_used ? " (fallback)" : ""}</td>
    </tr>`).join("");

  document.getElementById("spreads").innerHTML = data.calendar_spreads.map(c => `
    <tr>
      <td>${c.symbol}</td><td>${c.strategy_type}</td><td>${fmt(c.strike_price)}</td>
      <td>${c.front_month_days}d</td><td>${c.back_month_days}d</td>
      <td>${range(c.max_profit_zone_low, c.max_profit_zone_high)}</td><td>${range(c.breakeven_low, c.breakeven_high)}</td><td>${fmt(c.risk_reward_ratio)}</td>
    </tr>`).join("");
}

async function load() {
  const resp = await fetch("/api/data");
  if (resp.ok) render(await resp.json());
}

document.getElementById("refresh").addEventListener("click", async () => {
  await fetch("/api/refresh-scan", { method: "POST" });
  await load();
});

load();
setInterval(load, 60000);
</script>
</body>
</html>
"#;

pub const NOT_FOUND_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8"><title>Page not found</title></head>
<body style="font-family: sans-serif; margin: 3rem;">
<h1>404</h1>
<p>The page you requested does not exist.</p>
<p><a href="/">Back to the dashboard</a></p>
</body>
</html>
"#;
